//! Guest record layout tests
//!
//! Checks byte-exact layouts of the records guest drivers read and write,
//! isochronous packet packing, and saved-state compatibility.

use abi::{
    AbiError, CURRENT_VERSION, CompletionCode, DeviceHandle, DeviceRequest, IsoPacketStatus,
    IsoRequest, SavedState, StateVersion, UsbInternalDevice, UsbdEvent, decode_saved_state,
    encode_saved_state, pack_iso_packet, read_device_request, read_iso_request,
    unpack_iso_packet, write_device_list, write_iso_request,
};
use proptest::prelude::*;

mod layouts {
    use super::*;

    #[test]
    fn test_get_descriptor_request_from_guest() {
        // GET_DESCRIPTOR(device), wLength 0x12
        let bytes = [0x80, 0x06, 0x01, 0x00, 0x00, 0x00, 0x00, 0x12, 0xFF];
        let request = read_device_request(&bytes).unwrap();

        assert!(request.is_device_to_host());
        assert!(!request.is_set_configuration());
        assert_eq!(request.request, DeviceRequest::GET_DESCRIPTOR);
        assert_eq!(request.value, 0x0100);
        assert_eq!(request.length, 0x12);
    }

    #[test]
    fn test_short_guest_buffers_rejected() {
        assert!(matches!(
            read_device_request(&[0x00; 7]),
            Err(AbiError::BufferTooSmall { needed: 8, available: 7 })
        ));
        assert!(matches!(
            read_iso_request(&[0x00; IsoRequest::GUEST_SIZE - 1]),
            Err(AbiError::BufferTooSmall { .. })
        ));
    }

    #[test]
    fn test_iso_request_guest_layout() {
        let mut bytes = vec![
            0x30, 0x00, 0x10, 0x00, // buffer
            0x00, 0x00, 0x00, 0x07, // start frame
            0x00, 0x00, 0x00, 0x02, // packet count
        ];
        bytes.extend_from_slice(&[0x00, 0x40, 0x00, 0x20]);
        bytes.extend_from_slice(&[0x00; 12]);

        let request = read_iso_request(&bytes).unwrap();
        assert_eq!(request.buffer_addr, 0x3000_1000);
        assert_eq!(request.start_frame, 7);
        assert_eq!(request.packet_count(), 2);
        assert_eq!(request.total_length(), 0x60);

        let mut out = vec![0u8; IsoRequest::GUEST_SIZE];
        write_iso_request(&request, &mut out).unwrap();
        assert_eq!(out, bytes);
    }

    #[test]
    fn test_device_list_truncated_to_buffer() {
        let devices: Vec<_> = (1..=3)
            .filter_map(|n| UsbInternalDevice::for_handle(DeviceHandle(n)))
            .collect();

        let mut out = [0xAAu8; 10];
        assert_eq!(write_device_list(&devices, &mut out), 2);
        assert_eq!(out, [0x00, 0x01, 0x02, 0x40, 0x00, 0x02, 0x02, 0x40, 0xAA, 0xAA]);
    }

    #[test]
    fn test_event_triples() {
        assert_eq!(UsbdEvent::attach(DeviceHandle(2)), UsbdEvent::new(1, 2, 0));
        assert_eq!(UsbdEvent::terminate(), UsbdEvent::new(4, 0, 0));
        assert!(UsbdEvent::new(7, 0, 0).kind().is_none());
    }

    #[test]
    fn test_completion_codes() {
        let codes: Vec<u32> = [
            CompletionCode::NoError,
            CompletionCode::MissedFrame,
            CompletionCode::TransactionError,
            CompletionCode::Babble,
            CompletionCode::DataBuffer,
            CompletionCode::Halted,
        ]
        .iter()
        .map(|c| c.as_raw())
        .collect();
        assert_eq!(codes, vec![0, 0x10, 0x20, 0x40, 0x80, 0x100]);
    }
}

mod saved_state {
    use super::*;

    #[test]
    fn test_initialized_flag_survives() {
        let bytes = encode_saved_state(&SavedState::new(true)).unwrap();
        let state = decode_saved_state(&bytes).unwrap();
        assert!(state.initialized);
        assert_eq!(state.version, CURRENT_VERSION);
    }

    #[test]
    fn test_newer_major_rejected() {
        let future = SavedState {
            version: StateVersion {
                major: CURRENT_VERSION.major + 1,
                minor: 0,
            },
            initialized: true,
        };
        let bytes = encode_saved_state(&future).unwrap();
        assert!(matches!(
            decode_saved_state(&bytes),
            Err(AbiError::IncompatibleVersion { .. })
        ));
    }

    #[test]
    fn test_garbage_rejected() {
        assert!(decode_saved_state(&[]).is_err());
    }
}

fn iso_status_strategy() -> impl Strategy<Value = IsoPacketStatus> {
    prop_oneof![
        Just(IsoPacketStatus::NoError),
        Just(IsoPacketStatus::MissedFrame),
        Just(IsoPacketStatus::TransactionError),
        Just(IsoPacketStatus::Babble),
        Just(IsoPacketStatus::DataBuffer),
    ]
}

proptest! {
    #[test]
    fn prop_iso_packing_keeps_low_twelve_bits(status in iso_status_strategy(), len in any::<u32>()) {
        let word = pack_iso_packet(status, len);
        let (packed_status, packed_len) = unpack_iso_packet(word);

        prop_assert_eq!(packed_status, status as u8);
        prop_assert_eq!(u32::from(packed_len), len & 0xFFF);
    }
}
