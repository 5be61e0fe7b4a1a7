//! Parallel partition processing with a single collector
//!
//! Partitions are handed to a bounded set of scoped workers. Each worker
//! sends its outcome over a channel to the calling thread, which keys the
//! outcomes by partition so callers see them in ascending order regardless
//! of completion order.

use std::collections::BTreeMap;
use std::sync::{mpsc, Arc, Mutex};
use std::thread;

use crate::encode::EncodingError;
use crate::structure::{
    signature_file_name, Archive, ArchiveSigner, File, SignedArchive, StructureError,
    WritableNode,
};

use super::report::BuildStage;

/// Why a partition was dropped
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionError {
    pub stage: BuildStage,
    pub message: String,
}

impl From<EncodingError> for PartitionError {
    fn from(e: EncodingError) -> Self {
        Self {
            stage: BuildStage::Encode,
            message: e.to_string(),
        }
    }
}

impl From<StructureError> for PartitionError {
    fn from(e: StructureError) -> Self {
        let stage = match e {
            StructureError::Signing { .. } => BuildStage::Sign,
            _ => BuildStage::Assemble,
        };
        Self {
            stage,
            message: e.to_string(),
        }
    }
}

/// Default number of partition workers
pub fn default_workers() -> usize {
    thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

/// Run `work` over every partition on at most `workers` threads
pub fn run_partitions<K, T, N, F>(
    partitions: BTreeMap<K, Vec<T>>,
    workers: usize,
    work: F,
) -> BTreeMap<K, Result<N, PartitionError>>
where
    K: Ord + Send,
    T: Send,
    N: Send,
    F: Fn(&K, Vec<T>) -> Result<N, PartitionError> + Sync,
{
    let workers = workers.clamp(1, partitions.len().max(1));
    let queue = Mutex::new(partitions.into_iter());
    let (tx, rx) = mpsc::channel();

    thread::scope(|scope| {
        for _ in 0..workers {
            let tx = tx.clone();
            let queue = &queue;
            let work = &work;
            scope.spawn(move || loop {
                let next = match queue.lock() {
                    Ok(mut pending) => pending.next(),
                    Err(_) => None,
                };
                let Some((key, items)) = next else {
                    break;
                };
                let outcome = work(&key, items);
                if tx.send((key, outcome)).is_err() {
                    break;
                }
            });
        }
        drop(tx);

        rx.into_iter().collect()
    })
}

/// Wrap a payload into an archive, signed when a signer is present.
///
/// Signing runs here so that a signing failure drops this partition only.
pub fn seal(
    archive_name: String,
    payload_name: &str,
    payload: Vec<u8>,
    signer: Option<&Arc<dyn ArchiveSigner>>,
) -> Result<WritableNode, PartitionError> {
    let mut archive = Archive::new(archive_name);
    archive.add(File::new(payload_name, payload));

    match signer {
        Some(signer) => {
            let signed =
                SignedArchive::new(archive, Arc::clone(signer), signature_file_name(payload_name));
            signed.sign()?;
            Ok(signed.into())
        }
        None => Ok(archive.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_results_keyed_in_ascending_order() {
        let partitions: BTreeMap<u32, Vec<u32>> =
            (1..=6).map(|k| (k, vec![k; k as usize])).collect();

        let results = run_partitions(partitions, 3, |key, items| {
            // Later partitions finish first
            thread::sleep(Duration::from_millis(u64::from(10 - *key)));
            Ok(items.len())
        });

        let keys: Vec<_> = results.keys().copied().collect();
        assert_eq!(keys, vec![1, 2, 3, 4, 5, 6]);
        assert_eq!(results[&4], Ok(4));
    }

    #[test]
    fn test_failure_isolated_to_partition() {
        let partitions: BTreeMap<u32, Vec<u32>> = (1..=3).map(|k| (k, vec![k])).collect();

        let results = run_partitions(partitions, 2, |key, _| {
            if *key == 2 {
                Err(PartitionError {
                    stage: BuildStage::Encode,
                    message: "boom".to_string(),
                })
            } else {
                Ok(*key)
            }
        });

        assert_eq!(results[&1], Ok(1));
        assert!(results[&2].is_err());
        assert_eq!(results[&3], Ok(3));
    }

    #[test]
    fn test_no_partitions() {
        let results = run_partitions(BTreeMap::<u32, Vec<u32>>::new(), 4, |_, _| Ok(()));
        assert!(results.is_empty());
    }
}
