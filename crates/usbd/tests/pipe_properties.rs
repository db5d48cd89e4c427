//! Property-based tests for pipe handles and transfer ids

use abi::{DeviceHandle, MAX_TRANSFERS, PIPE_HANDLE_BASE, PipeHandle};
use proptest::prelude::*;
use std::collections::HashSet;
use usbd::{PeripheralKind, UsbHandler, UsbdConfig};

#[derive(Debug, Clone)]
enum PipeOp {
    Open(u8),
    /// Close the n-th currently open pipe (modulo the count)
    Close(usize),
}

fn pipe_op_strategy() -> impl Strategy<Value = PipeOp> {
    prop_oneof![
        (0u8..=0x8F).prop_map(PipeOp::Open),
        any::<usize>().prop_map(PipeOp::Close),
    ]
}

fn ready_handler() -> UsbHandler {
    let mut config = UsbdConfig::default();
    config.emulation.always_present = vec![PeripheralKind::Turntable];
    config.timing.attach_delay_us = 0;

    let handler = UsbHandler::new(&config, None);
    handler.initialize().unwrap();
    handler
        .register_extra_ldd("dj", 0x12BA, 0x0140, 0x0140)
        .unwrap();
    handler
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_pipe_handles_never_reused(ops in prop::collection::vec(pipe_op_strategy(), 1..60)) {
        let handler = ready_handler();
        let mut open: Vec<PipeHandle> = Vec::new();
        let mut issued: HashSet<PipeHandle> = HashSet::new();

        for op in ops {
            match op {
                PipeOp::Open(endpoint) => {
                    let pipe = handler.open_pipe(DeviceHandle(1), endpoint).unwrap();
                    prop_assert!(pipe.0 >= PIPE_HANDLE_BASE);
                    prop_assert!(issued.insert(pipe), "handle {:#x} reissued", pipe.0);
                    open.push(pipe);
                }
                PipeOp::Close(n) if !open.is_empty() => {
                    let pipe = open.remove(n % open.len());
                    prop_assert!(handler.close_pipe(pipe).is_ok());
                    prop_assert!(!handler.is_pipe(pipe));
                    prop_assert!(handler.close_pipe(pipe).is_err());
                }
                PipeOp::Close(_) => {}
            }
        }

        for pipe in &open {
            prop_assert!(handler.is_pipe(*pipe));
        }
    }

    #[test]
    fn prop_busy_transfer_ids_distinct(count in 1usize..MAX_TRANSFERS) {
        let handler = ready_handler();
        let pipe = handler.open_pipe(DeviceHandle(1), 0x81).unwrap();

        let ids: HashSet<_> = (0..count)
            .map(|_| handler.transfer_data(pipe, &[0; 27], None).unwrap())
            .collect();

        prop_assert_eq!(ids.len(), count);
        prop_assert!(ids.iter().all(|id| (id.0 as usize) < MAX_TRANSFERS));
        prop_assert_eq!(handler.busy_transfers(), count);
    }

    #[test]
    fn prop_unknown_devices_rejected(handle in 2u32..u32::MAX, endpoint in any::<u8>()) {
        let handler = ready_handler();
        prop_assert!(handler.open_pipe(DeviceHandle(handle), endpoint).is_err());
        prop_assert!(handler.get_descriptor_size(DeviceHandle(handle)).is_err());
    }
}
