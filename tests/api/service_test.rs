// File Service Tests
// Upload, served proofs and the node assembly around them

use fileset_mesh::api::{verify_download, FileService, UploadRequest};
use fileset_mesh::config::NodeConfig;
use fileset_mesh::model::{File, NodeId, SetId};
use fileset_mesh::network::{MemoryHub, PubSub, SetAnnouncement};
use fileset_mesh::node::Node;
use fileset_mesh::proof::{encode_hex, root_of};
use fileset_mesh::protocol::{Broadcaster, PendingSetAggregator, Processor, StreamerConfig};
use fileset_mesh::storage::{FileStore, Persistence};
use fileset_mesh::Error;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

async fn service() -> (FileService, Arc<FileStore>) {
    let hub = MemoryHub::default();
    let pubsub: Arc<dyn PubSub> = Arc::new(hub.peer());
    let node_id = NodeId::generate();
    let store = Arc::new(FileStore::temporary().unwrap());
    let processor = Arc::new(Processor::new(
        store.clone(),
        Arc::new(PendingSetAggregator::default()),
    ));
    let announcements = SetAnnouncement::join_announcements(pubsub.clone(), node_id.clone())
        .await
        .unwrap();
    let broadcaster = Broadcaster::new(pubsub, node_id, announcements, Duration::ZERO);
    (FileService::new(processor, broadcaster), store)
}

fn contents(items: &[&[u8]]) -> Vec<Vec<u8>> {
    items.iter().map(|c| c.to_vec()).collect()
}

// ============================================================================
// UPLOAD
// ============================================================================

#[tokio::test]
async fn test_upload_returns_set_id_and_root() {
    let (service, _store) = service().await;
    let response = service
        .upload(contents(&[b"foo", b"bar", b"baz", b"qux"]))
        .await
        .unwrap();

    assert!(response.success);
    assert_eq!(response.root.len(), 66);
    assert_eq!(
        response.root,
        encode_hex(&root_of(&[b"foo", b"bar", b"baz", b"qux"]).unwrap())
    );
}

#[tokio::test]
async fn test_upload_rejects_empty_set() {
    let (service, _store) = service().await;
    assert!(matches!(service.upload(Vec::new()).await, Err(Error::EmptyInput)));
}

#[tokio::test]
async fn test_upload_with_declared_root() {
    let (service, store) = service().await;
    let files = contents(&[b"a", b"b", b"c"]);
    let root = encode_hex(&root_of(&files).unwrap());

    let accepted = service.upload_with_root(files.clone(), &root).await.unwrap();
    assert_eq!(accepted.root, root);

    let wrong = encode_hex(&root_of(&[b"x"]).unwrap());
    let before = store.set_ids().unwrap().len();
    assert!(matches!(
        service.upload_with_root(files, &wrong).await,
        Err(Error::RootMismatch { .. })
    ));
    assert_eq!(store.set_ids().unwrap().len(), before);
}

#[tokio::test]
async fn test_upload_request_round_trip_through_json() {
    let request = UploadRequest::from_contents(&[b"hello".as_slice(), b"world".as_slice()]);
    let json = serde_json::to_string(&request).unwrap();
    let parsed: UploadRequest = serde_json::from_str(&json).unwrap();

    let (service, _store) = service().await;
    let response = service.upload(parsed.decode_files().unwrap()).await.unwrap();
    assert_eq!(
        response.root,
        encode_hex(&root_of(&[b"hello", b"world"]).unwrap())
    );
}

// ============================================================================
// READ WITH PROOF
// ============================================================================

#[tokio::test]
async fn test_every_served_file_verifies() {
    let (service, _store) = service().await;
    let files: [&[u8]; 5] = [b"one", b"two", b"three", b"four", b"five"];
    let uploaded = service.upload(contents(&files)).await.unwrap();
    let set_id = SetId::from(uploaded.set_id.clone());

    for (index, expected) in files.iter().enumerate() {
        let response = service.file(&set_id, index).unwrap();
        assert_eq!(response.proof.index, index as u64);
        assert_eq!(response.proof.proof.len(), 3);
        let verified = verify_download(&response, &uploaded.root).unwrap();
        assert_eq!(verified, expected.to_vec());
    }
}

#[tokio::test]
async fn test_duplicate_contents_served_at_requested_position() {
    let (service, _store) = service().await;
    let uploaded = service
        .upload(contents(&[b"dup", b"x", b"dup"]))
        .await
        .unwrap();

    let response = service.file(&uploaded.set_id.clone().into(), 2).unwrap();
    assert_eq!(response.proof.index, 2);
    assert!(verify_download(&response, &uploaded.root).is_ok());
}

#[tokio::test]
async fn test_read_errors() {
    let (service, store) = service().await;

    assert!(matches!(
        service.file(&"unknown".into(), 0),
        Err(Error::NotFound(_))
    ));

    let uploaded = service.upload(contents(&[b"a", b"b"])).await.unwrap();
    assert!(matches!(
        service.file(&uploaded.set_id.clone().into(), 2),
        Err(Error::NotFound(_))
    ));

    // A set only partly received
    store
        .save_file(&File::new("partial".into(), 3, 0, b"p".to_vec()))
        .unwrap();
    assert!(matches!(
        service.file(&"partial".into(), 0),
        Err(Error::SetIncomplete {
            expected: 3,
            found: 1,
            ..
        })
    ));
}

#[tokio::test]
async fn test_tampered_record_fails_closed() {
    let (service, store) = service().await;
    let uploaded = service.upload(contents(&[b"a", b"b"])).await.unwrap();
    let set_id = SetId::from(uploaded.set_id.clone());

    let mut record = store.file(&set_id, 1).unwrap();
    record.contents = b"evil".to_vec();
    store.put_record(&record).unwrap();

    assert!(matches!(service.file(&set_id, 0), Err(Error::SetCorrupted(_))));
}

#[tokio::test]
async fn test_root_of_assembled_set() {
    let (service, store) = service().await;
    let uploaded = service
        .upload(contents(&[b"r1", b"r2", b"r3"]))
        .await
        .unwrap();

    let root = service.root(&uploaded.set_id.clone().into()).unwrap();
    assert_eq!(encode_hex(&root), uploaded.root);

    store
        .save_file(&File::new("partial".into(), 2, 0, b"p".to_vec()))
        .unwrap();
    assert!(matches!(
        service.root(&"partial".into()),
        Err(Error::SetIncomplete { .. })
    ));
}

// ============================================================================
// NODES ON A SHARED HUB
// ============================================================================

fn node_config() -> NodeConfig {
    NodeConfig::new()
        .with_announce_grace(Duration::from_millis(200))
        .with_streamer(StreamerConfig::new().with_set_idle_timeout(Duration::from_secs(5)))
}

#[tokio::test]
async fn test_upload_on_one_node_served_by_another() {
    let hub = MemoryHub::default();
    let alice = Node::start_with_pubsub(node_config(), Arc::new(hub.peer()), NodeId::generate())
        .await
        .unwrap();
    let mut bob = Node::start_with_pubsub(node_config(), Arc::new(hub.peer()), NodeId::generate())
        .await
        .unwrap();
    let mut completions = bob.take_completions().unwrap();

    let uploaded = alice
        .service()
        .upload(contents(&[b"foo", b"bar", b"baz"]))
        .await
        .unwrap();

    let completed = tokio::time::timeout(Duration::from_secs(5), completions.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(completed.set_id.as_str(), uploaded.set_id);
    assert_eq!(encode_hex(&completed.root), uploaded.root);

    let response = bob.service().file(&completed.set_id, 1).unwrap();
    assert_eq!(verify_download(&response, &uploaded.root).unwrap(), b"bar".to_vec());

    alice.shutdown().await.unwrap();
    bob.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_node_recovers_sets_after_restart() {
    let temp_dir = TempDir::new().unwrap();
    let config = node_config().with_data_dir(temp_dir.path());

    let uploaded = {
        let node = Node::start_with_pubsub(
            config.clone(),
            Arc::new(MemoryHub::default().peer()),
            NodeId::generate(),
        )
        .await
        .unwrap();
        let uploaded = node.service().upload(contents(&[b"kept"])).await.unwrap();
        node.shutdown().await.unwrap();
        uploaded
    };

    let node = Node::start_with_pubsub(
        config,
        Arc::new(MemoryHub::default().peer()),
        NodeId::generate(),
    )
    .await
    .unwrap();
    assert_eq!(node.recovered().len(), 1);
    assert_eq!(node.recovered()[0].set_id.as_str(), uploaded.set_id);
    assert_eq!(encode_hex(&node.recovered()[0].root), uploaded.root);
    node.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_offline_service_reads_stopped_node_store() {
    let temp_dir = TempDir::new().unwrap();
    let config = node_config().with_data_dir(temp_dir.path());

    let node = Node::start_with_pubsub(
        config.clone(),
        Arc::new(MemoryHub::default().peer()),
        NodeId::generate(),
    )
    .await
    .unwrap();
    let uploaded = node
        .service()
        .upload(contents(&[b"left", b"right"]))
        .await
        .unwrap();
    node.shutdown().await.unwrap();

    let service = Node::offline_service(&config).await.unwrap();
    let set_id = SetId::from(uploaded.set_id.clone());
    assert_eq!(encode_hex(&service.root(&set_id).unwrap()), uploaded.root);

    let response = service.file(&set_id, 1).unwrap();
    assert_eq!(verify_download(&response, &uploaded.root).unwrap(), b"right".to_vec());
}
