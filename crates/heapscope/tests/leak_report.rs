#[cfg(all(test, not(feature = "untracked")))]
pub mod tests {
    use std::io;
    use std::sync::{Arc, Mutex};

    use heapscope::{global, BackingAlloc, HeapAllocator, HeapError, Malloc, TrackedHeap};
    use tracing::Level;

    struct Capture(Arc<Mutex<Vec<u8>>>);

    impl io::Write for Capture {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn captured_subscriber() -> (
        Arc<Mutex<Vec<u8>>>,
        impl tracing::Subscriber + Send + Sync + 'static,
    ) {
        let events: Arc<Mutex<Vec<u8>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(Level::DEBUG)
            .with_ansi(false)
            .with_writer(move || Capture(Arc::clone(&sink)))
            .finish();
        (events, subscriber)
    }

    // Tearing the process heap down with live blocks emits one summary
    // event plus one event per leaked record, without freeing anything.
    #[test]
    fn test_terminate_reports_leaked_blocks() {
        let (events, subscriber) = captured_subscriber();

        tracing::subscriber::with_default(subscriber, || {
            global::initialize().unwrap();
            let first = global::allocate(48);
            let second = global::allocate(16);
            assert!(!first.is_null() && !second.is_null());

            global::terminate();
            assert!(matches!(global::info(), Err(HeapError::NotInitialized)));

            // The leak report never reclaims the blocks; they stay live
            // and go back through the backing heap.
            unsafe {
                first.write_bytes(0x6b, 48);
                second.write_bytes(0x6b, 16);
                Malloc.free(first);
                Malloc.free(second);
            }
        });

        let text = String::from_utf8(events.lock().unwrap().clone()).unwrap();
        assert!(
            text.contains("heap tracking stopped with live allocations"),
            "got:\n{text}"
        );
        assert!(text.contains("leaked_blocks=2"), "got:\n{text}");
        assert!(text.contains("leaked_bytes=64"), "got:\n{text}");
        assert_eq!(text.matches("leaked block").count(), 2, "got:\n{text}");
        assert!(text.contains("size=48"), "got:\n{text}");
        assert!(text.contains("size=16"), "got:\n{text}");
        // Each record carries its allocation site.
        assert!(text.contains("leak_report.rs"), "got:\n{text}");
    }

    #[test]
    fn test_dropping_heap_reports_leaked_blocks() {
        let (events, subscriber) = captured_subscriber();

        let leaked = tracing::subscriber::with_default(subscriber, || {
            let heap = TrackedHeap::new();
            let ptr = heap.allocate(80);
            assert!(!ptr.is_null());
            drop(heap);
            ptr as usize
        });

        let text = String::from_utf8(events.lock().unwrap().clone()).unwrap();
        assert!(
            text.contains("heap tracking stopped with live allocations"),
            "got:\n{text}"
        );
        assert!(text.contains("leaked_blocks=1"), "got:\n{text}");
        assert!(text.contains("leaked_bytes=80"), "got:\n{text}");
        assert_eq!(text.matches("leaked block").count(), 1, "got:\n{text}");

        let ptr = leaked as *mut u8;
        unsafe {
            ptr.write_bytes(0x3c, 80);
            Malloc.free(ptr);
        }
    }
}
