// Property Tests for SmoothFS
// Any in-bounds or out-of-bounds range read through the cache matches the backing bytes

use proptest::prelude::*;
use smoothfs::{BlockSource, CachedFile, Options, WorkerPool, BLOCK_SIZE};
use std::io;
use std::sync::Arc;

const FILE_LEN: usize = 3 * BLOCK_SIZE + 4321;

#[derive(Debug)]
struct MemorySource {
    data: Vec<u8>,
}

impl BlockSource for MemorySource {
    fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<usize> {
        let start = (offset as usize).min(self.data.len());
        let n = buf.len().min(self.data.len() - start);
        buf[..n].copy_from_slice(&self.data[start..start + n]);
        Ok(n)
    }
}

fn backing_data() -> Vec<u8> {
    (0..FILE_LEN).map(|i| (i.wrapping_mul(2_654_435_761) >> 13) as u8).collect()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn read_matches_backing_store(
        offset in 0usize..FILE_LEN + BLOCK_SIZE,
        length in 0usize..3 * BLOCK_SIZE,
        threshold in 1usize..6,
    ) {
        let data = backing_data();
        let options = Options::default().eviction_threshold(threshold);
        let pool = WorkerPool::start(options.worker_count).unwrap();
        let source = Arc::new(MemorySource { data: data.clone() });
        let file = CachedFile::new("/mem", "/cache/mem", source, pool.queue(), &options);

        let start = offset.min(FILE_LEN);
        let end = (offset + length).min(FILE_LEN);
        let expected = &data[start..end];

        let first = file.read(offset as i64, length as i64).unwrap();
        prop_assert_eq!(&first[..], expected);

        // Second read of the same range is identical
        let second = file.read(offset as i64, length as i64).unwrap();
        prop_assert_eq!(&second[..], expected);
    }

    #[test]
    fn sequence_of_reads_matches_backing_store(
        ranges in prop::collection::vec((0usize..FILE_LEN, 1usize..BLOCK_SIZE + 100), 1..12),
    ) {
        let data = backing_data();
        let options = Options::default();
        let pool = WorkerPool::start(2).unwrap();
        let file = CachedFile::new("/mem", "/cache/mem", Arc::new(MemorySource { data: data.clone() }), pool.queue(), &options);

        for (offset, length) in ranges {
            let end = (offset + length).min(FILE_LEN);
            let got = file.read(offset as i64, length as i64).unwrap();
            prop_assert_eq!(&got[..], &data[offset..end]);
        }
    }
}
