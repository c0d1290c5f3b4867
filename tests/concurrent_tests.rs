// Concurrent Access Tests for SmoothFS
// These tests verify thread-safety, bounded backing concurrency, cancellation and deadlines

use rand::Rng;
use smoothfs::{BlockNumber, BlockSource, CachedFile, Error, Options, WorkerPool, BLOCK_SIZE};
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::{Duration, Instant};

/// In-memory backing store with an artificial per-read latency.
#[derive(Debug)]
struct SlowSource {
    data: Vec<u8>,
    latency: Duration,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
    reads: AtomicUsize,
}

impl SlowSource {
    fn new(len: usize, latency: Duration) -> Self {
        let mut data = vec![0u8; len];
        rand::rng().fill(&mut data[..]);
        Self {
            data,
            latency,
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            reads: AtomicUsize::new(0),
        }
    }
}

impl BlockSource for SlowSource {
    fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<usize> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        self.reads.fetch_add(1, Ordering::SeqCst);

        thread::sleep(self.latency);
        let start = (offset as usize).min(self.data.len());
        let n = buf.len().min(self.data.len() - start);
        buf[..n].copy_from_slice(&self.data[start..start + n]);

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        Ok(n)
    }
}

fn open(source: SlowSource, options: &Options) -> (WorkerPool, Arc<SlowSource>, Arc<CachedFile>) {
    env_logger::try_init().ok();

    let pool = WorkerPool::start(options.worker_count).unwrap();
    let source = Arc::new(source);
    let file = CachedFile::new("/slow/file", "/cache/file", source.clone(), pool.queue(), options);
    (pool, source, file)
}

fn eventually(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    condition()
}

/// Many readers over overlapping ranges each get correct bytes
#[test]
fn test_concurrent_overlapping_reads() {
    let len = 16 * BLOCK_SIZE + 777;
    let options = Options::default().worker_count(4).eviction_threshold(4);
    let (_pool, source, file) = open(SlowSource::new(len, Duration::from_micros(200)), &options);

    let num_threads = 16;
    let reads_per_thread = 50;
    let barrier = Arc::new(Barrier::new(num_threads));
    let mut handles = vec![];

    for thread_id in 0..num_threads {
        let file = Arc::clone(&file);
        let source = Arc::clone(&source);
        let barrier = Arc::clone(&barrier);
        let handle = thread::spawn(move || {
            barrier.wait(); // Synchronize start

            let mut rng = rand::rng();
            for _ in 0..reads_per_thread {
                // Concentrate on the first few blocks so ranges overlap heavily
                let offset = rng.random_range(0..4 * BLOCK_SIZE);
                let length = rng.random_range(1..2 * BLOCK_SIZE);
                let end = (offset + length).min(source.data.len());

                let got = file.read(offset as i64, length as i64).unwrap();
                assert_eq!(
                    &got[..],
                    &source.data[offset..end],
                    "Thread {} offset {} length {}",
                    thread_id,
                    offset,
                    length
                );
            }
        });
        handles.push(handle);
    }

    for handle in handles {
        handle.join().unwrap();
    }

    assert!(eventually(|| file.loaded_count() <= 4));

    // Load order and block map stayed in step: every recorded block is loaded
    for block in file.loaded_blocks() {
        assert!(file.is_loaded(block));
    }
}

/// Backing-store concurrency never exceeds the pool size
#[test]
fn test_backing_concurrency_is_bounded() {
    let workers = 3;
    let options = Options::default().worker_count(workers).eviction_threshold(64);
    let (_pool, source, file) = open(SlowSource::new(32 * BLOCK_SIZE, Duration::from_millis(5)), &options);

    let mut handles = vec![];
    for reader in 0..8 {
        let file = Arc::clone(&file);
        handles.push(thread::spawn(move || {
            let offset = (reader * 4 * BLOCK_SIZE) as i64;
            file.read(offset, (4 * BLOCK_SIZE) as i64).unwrap();
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }

    assert!(source.peak.load(Ordering::SeqCst) <= workers);
    assert_eq!(file.loaded_count(), 32);
}

/// All blocks of one read are fetched in parallel, not one after another
#[test]
fn test_scatter_gather_fetches_in_parallel() {
    let options = Options::default().worker_count(4).eviction_threshold(16);
    let (_pool, source, file) = open(SlowSource::new(4 * BLOCK_SIZE, Duration::from_millis(50)), &options);

    let got = file.read(0, (4 * BLOCK_SIZE) as i64).unwrap();
    assert_eq!(got.len(), 4 * BLOCK_SIZE);
    assert!(source.peak.load(Ordering::SeqCst) > 1);
}

/// Cancelling a read returns early, and the fetch still fills the cache
#[test]
fn test_cancelled_read_still_populates_cache() {
    let options = Options::default().worker_count(1);
    let (_pool, _source, file) = open(SlowSource::new(BLOCK_SIZE, Duration::from_millis(300)), &options);

    let (cancel_tx, cancel_rx) = crossbeam::channel::bounded(1);
    let canceller = thread::spawn(move || {
        thread::sleep(Duration::from_millis(20));
        cancel_tx.send(()).unwrap();
    });

    let start = Instant::now();
    let result = file.read_cancellable(0, 100, &cancel_rx);
    assert!(matches!(result, Err(Error::Cancelled)));
    assert!(start.elapsed() < Duration::from_millis(300));
    canceller.join().unwrap();

    // The worker was not blocked by the departed caller
    assert!(eventually(|| file.is_loaded(BlockNumber::new(0))));
    assert_eq!(file.read(0, 100).unwrap().len(), 100);
}

/// A request deadline turns a slow read into a timeout instead of a hang
#[test]
fn test_request_timeout() {
    let options = Options::default().worker_count(1).request_timeout(Duration::from_millis(30));
    let (_pool, _source, file) = open(SlowSource::new(BLOCK_SIZE, Duration::from_millis(300)), &options);

    let err = file.read(0, 10).unwrap_err();
    assert!(matches!(err, Error::Timeout(_)));
    assert!(err.is_retryable());

    assert!(eventually(|| file.is_loaded(BlockNumber::new(0))));
    assert_eq!(file.read(0, 10).unwrap().len(), 10);
}

/// An interrupt from the front end wins over a slow read
#[test]
fn test_interrupted_read() {
    let options = Options::default().worker_count(1);
    let (_pool, source, file) = open(SlowSource::new(BLOCK_SIZE, Duration::from_millis(200)), &options);

    let (intr_tx, intr_rx) = crossbeam::channel::bounded(1);
    intr_tx.send(()).unwrap();
    assert!(matches!(file.read_interruptible(0, 10, &intr_rx), Err(Error::Interrupted)));

    // Without an interrupt the read completes normally
    let (_intr_tx, intr_rx) = crossbeam::channel::bounded::<()>(1);
    let got = file.read_interruptible(5, 10, &intr_rx).unwrap();
    assert_eq!(&got[..], &source.data[5..15]);
}

/// Concurrent readers racing on the same missing block fetch it without
/// duplicating it in the load order
#[test]
fn test_racing_fetches_of_same_block() {
    let options = Options::default().worker_count(4).eviction_threshold(8);
    let (_pool, source, file) = open(SlowSource::new(BLOCK_SIZE, Duration::from_millis(20)), &options);

    let barrier = Arc::new(Barrier::new(8));
    let handles: Vec<_> = (0..8)
        .map(|_| {
            let file = Arc::clone(&file);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                file.read(0, 64).unwrap()
            })
        })
        .collect();

    for handle in handles {
        assert_eq!(&handle.join().unwrap()[..], &source.data[..64]);
    }

    assert_eq!(file.loaded_blocks(), vec![BlockNumber::new(0)]);
}
