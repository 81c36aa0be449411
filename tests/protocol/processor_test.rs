// Processor Tests
// Persistence-then-tracking, root derivation and restart recovery

use fileset_mesh::model::{File, SetId};
use fileset_mesh::proof::root_of;
use fileset_mesh::protocol::{PendingSetAggregator, Processor};
use fileset_mesh::storage::{FileStore, Persistence, StoreError, StoredFile};
use fileset_mesh::Error;
use std::sync::Arc;
use tempfile::TempDir;

fn processor_with(store: Arc<dyn Persistence>) -> Processor {
    Processor::new(store, Arc::new(PendingSetAggregator::default()))
}

fn set(id: &str, contents: &[&[u8]]) -> Vec<File> {
    contents
        .iter()
        .enumerate()
        .map(|(i, c)| File::new(id.into(), contents.len(), i, c.to_vec()))
        .collect()
}

/// Store that refuses every write
struct ReadOnlyStore;

impl Persistence for ReadOnlyStore {
    fn save_file(&self, _file: &File) -> Result<(), StoreError> {
        Err(StoreError::DatabaseError("read-only".to_string()))
    }

    fn file(&self, set_id: &SetId, index: usize) -> Result<StoredFile, StoreError> {
        Err(StoreError::NotFound(format!("{}/{}", set_id, index)))
    }

    fn files(&self, set_id: &SetId) -> Result<Vec<StoredFile>, StoreError> {
        Err(StoreError::NotFound(set_id.to_string()))
    }

    fn set_ids(&self) -> Result<Vec<SetId>, StoreError> {
        Ok(Vec::new())
    }
}

// ============================================================================
// INGESTION
// ============================================================================

#[test]
fn test_out_of_order_files_complete_with_expected_root() {
    let processor = processor_with(Arc::new(FileStore::temporary().unwrap()));
    let files = set("s", &[b"foo", b"bar", b"baz"]);
    let set_id: SetId = "s".into();

    for index in [2, 0] {
        processor.process_file(files[index].clone()).unwrap();
        let err = processor.complete_set(&set_id).unwrap_err();
        assert!(err.is_incomplete());
    }

    processor.process_file(files[1].clone()).unwrap();
    let root = processor.complete_set(&set_id).unwrap();
    assert_eq!(root, root_of(&[b"foo", b"bar", b"baz"]).unwrap());
}

#[test]
fn test_incomplete_error_reports_progress() {
    let processor = processor_with(Arc::new(FileStore::temporary().unwrap()));
    let files = set("s", &[b"a", b"b", b"c"]);
    processor.process_file(files[0].clone()).unwrap();

    match processor.complete_set(&"s".into()) {
        Err(Error::SetIncomplete {
            set_id,
            expected,
            found,
        }) => {
            assert_eq!(set_id, "s");
            assert_eq!((expected, found), (3, 1));
        }
        other => panic!("expected SetIncomplete, got {:?}", other),
    }
}

#[test]
fn test_failed_persistence_is_not_tracked() {
    let processor = processor_with(Arc::new(ReadOnlyStore));
    let file = File::new("s".into(), 1, 0, b"x".to_vec());

    assert!(matches!(processor.process_file(file), Err(Error::Store(_))));
    assert_eq!(processor.pending().pending_sets(), 0);
}

#[test]
fn test_inconsistent_counts_are_corrupted() {
    let processor = processor_with(Arc::new(FileStore::temporary().unwrap()));
    processor
        .process_file(File::new("s".into(), 2, 0, b"a".to_vec()))
        .unwrap();
    processor
        .process_file(File::new("s".into(), 3, 1, b"b".to_vec()))
        .unwrap();

    let err = processor.complete_set(&"s".into()).unwrap_err();
    assert!(err.is_corrupted());
}

#[test]
fn test_process_files_returns_root() {
    let processor = processor_with(Arc::new(FileStore::temporary().unwrap()));
    let root = processor
        .process_files(&"s".into(), set("s", &[b"foo", b"bar", b"baz", b"qux"]))
        .unwrap();
    assert_eq!(root, root_of(&[b"foo", b"bar", b"baz", b"qux"]).unwrap());
    assert_eq!(processor.store().files(&"s".into()).unwrap().len(), 4);
}

#[test]
fn test_process_files_rejects_empty_set() {
    let processor = processor_with(Arc::new(FileStore::temporary().unwrap()));
    assert!(matches!(
        processor.process_files(&"s".into(), Vec::new()),
        Err(Error::EmptyInput)
    ));
}

// ============================================================================
// RECOVERY
// ============================================================================

#[test]
fn test_recovery_reports_only_complete_sets() {
    let temp_dir = TempDir::new().unwrap();
    let expected_root = root_of(&[b"one", b"two"]).unwrap();

    {
        let store = Arc::new(FileStore::open(temp_dir.path()).unwrap());
        let processor = processor_with(store.clone());
        processor
            .process_files(&"done".into(), set("done", &[b"one", b"two"]))
            .unwrap();
        processor
            .process_file(set("half", &[b"a", b"b"])[0].clone())
            .unwrap();
        store.flush().unwrap();
    }

    let store = Arc::new(FileStore::open(temp_dir.path()).unwrap());
    let processor = processor_with(store);
    let recovered = processor.recover_persisted_sets().unwrap();

    assert_eq!(recovered.len(), 1);
    assert_eq!(recovered[0].set_id, SetId::from("done"));
    assert_eq!(recovered[0].root, expected_root);
}

#[test]
fn test_recovery_skips_tampered_sets() {
    let store = Arc::new(FileStore::temporary().unwrap());
    let processor = processor_with(store.clone());
    processor
        .process_files(&"s".into(), set("s", &[b"a", b"b"]))
        .unwrap();

    let mut record = store.file(&"s".into(), 0).unwrap();
    record.contents = b"changed".to_vec();
    store.put_record(&record).unwrap();

    assert!(processor.recover_persisted_sets().unwrap().is_empty());
}
