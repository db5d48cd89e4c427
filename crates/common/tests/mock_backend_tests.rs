//! Integration tests for the scripted host backend and guest mailboxes

use abi::{DeviceRequest, UsbdEvent};
use common::test_utils::{DEFAULT_TEST_TIMEOUT, MockCall, MockHostBackend, wait_until};
use common::{
    HostBackend, HostCompletion, HostDeviceId, HostStatus, HostTransfer, WakeSignal,
    create_guest_mailbox,
};
use std::sync::{Arc, Mutex};
use std::time::Duration;

fn control_in(length: u16) -> HostTransfer {
    HostTransfer::Control {
        request: DeviceRequest {
            request_type: 0x80,
            request: DeviceRequest::GET_DESCRIPTOR,
            value: 0x0100,
            index: 0,
            length,
        },
        data: vec![0; length as usize],
    }
}

mod backend {
    use super::*;

    #[test]
    fn test_descriptors_include_config_tree() {
        let backend = MockHostBackend::new().with_device(0x1430, 0x0150);
        let id = HostDeviceId { bus: 1, address: 1 };

        let bytes = backend.descriptors(id).unwrap();
        assert_eq!(bytes.len(), 18 + 25);
        assert_eq!(&bytes[8..12], &[0x30, 0x14, 0x50, 0x01]);
        assert_eq!(backend.calls(), vec![MockCall::Descriptors(id)]);
    }

    #[test]
    fn test_unknown_device_descriptors() {
        let backend = MockHostBackend::new();
        assert!(backend.descriptors(HostDeviceId { bus: 1, address: 9 }).is_err());
    }

    #[test]
    fn test_failing_enumeration() {
        let backend = MockHostBackend::new()
            .with_device(0x1430, 0x0150)
            .with_failing_enumeration();
        assert!(backend.enumerate().is_err());
    }

    #[test]
    fn test_submissions_complete_in_order() {
        let backend = MockHostBackend::new().with_device(0x0E6F, 0x0241);
        let id = backend.enumerate().unwrap()[0].id;
        let results = Arc::new(Mutex::new(Vec::new()));

        for tag in 0..3u8 {
            let results = Arc::clone(&results);
            backend
                .submit(
                    id,
                    control_in(2),
                    Box::new(move |completion| {
                        results.lock().unwrap().push((tag, completion.status));
                    }),
                )
                .unwrap();
        }
        assert_eq!(backend.pending_submissions(), 3);

        assert!(backend.complete_next(HostCompletion::completed(vec![1, 2])));
        assert!(backend.complete_next(HostCompletion::with_status(HostStatus::Stall)));
        assert!(backend.complete_next(HostCompletion::with_status(HostStatus::TimedOut)));
        assert!(!backend.complete_next(HostCompletion::completed(Vec::new())));

        assert_eq!(
            *results.lock().unwrap(),
            vec![
                (0, HostStatus::Completed),
                (1, HostStatus::Stall),
                (2, HostStatus::TimedOut)
            ]
        );
    }

    #[test]
    fn test_rejected_submission_drops_callback() {
        let backend = MockHostBackend::new()
            .with_device(0x0E6F, 0x0241)
            .with_rejected_submissions();
        let id = backend.enumerate().unwrap()[0].id;

        let result = backend.submit(id, control_in(4), Box::new(|_| panic!("must not run")));
        assert!(result.is_err());
        assert_eq!(backend.pending_submissions(), 0);
        assert_eq!(backend.calls(), vec![MockCall::Submit(id, control_in(4))]);
    }

    #[test]
    fn test_event_polls_counted() {
        let backend = MockHostBackend::new();
        backend.handle_events(Duration::from_micros(200)).unwrap();
        backend.handle_events(Duration::from_micros(200)).unwrap();
        assert_eq!(backend.event_polls(), 2);
    }
}

mod mailbox {
    use super::*;

    #[test]
    fn test_signals_kept_in_order() {
        let mailbox = create_guest_mailbox();
        mailbox.interrupt().unwrap();
        mailbox.deliver(UsbdEvent::new(3, 1, 0)).unwrap();
        assert_eq!(mailbox.pending(), 2);

        assert_eq!(mailbox.try_take(), Some(WakeSignal::Interrupt));
        assert_eq!(
            mailbox.try_take(),
            Some(WakeSignal::Deliver(UsbdEvent::new(3, 1, 0)))
        );
        assert_eq!(mailbox.try_take(), None);
    }

    #[test]
    fn test_interrupt_wakes_blocked_waiter() {
        let mailbox = Arc::new(create_guest_mailbox());
        let waiter = Arc::clone(&mailbox);
        let done = Arc::new(Mutex::new(None));
        let slot = Arc::clone(&done);

        let handle = std::thread::spawn(move || {
            *slot.lock().unwrap() = Some(waiter.wait().unwrap());
        });

        mailbox.interrupt().unwrap();
        assert!(wait_until(DEFAULT_TEST_TIMEOUT, || done.lock().unwrap().is_some()));
        handle.join().unwrap();
        assert_eq!(*done.lock().unwrap(), Some(WakeSignal::Interrupt));
    }
}
