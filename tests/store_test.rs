mod common;

use std::sync::Arc;

use common::memory_store;
use promptline::store::{DEFAULT_CHAT_PREFIX, DEFAULT_INDEX_KEY};
use promptline::{Chat, ChatIndex, ConversationStore, FileStore, KeyValueStore, MessagePair};

async fn chat_record_count(backend: &dyn KeyValueStore) -> usize {
    backend
        .list_keys()
        .await
        .unwrap()
        .iter()
        .filter(|k| k.starts_with(DEFAULT_CHAT_PREFIX))
        .count()
}

#[tokio::test]
async fn test_first_load_creates_one_chat() {
    let (backend, store) = memory_store("OllamaLocal");

    let index = store.load_index().await.unwrap();
    assert_eq!(index.chats.len(), 1);
    assert_eq!(index.current_chat_id, index.chats[0].id);
    assert!(backend.read(DEFAULT_INDEX_KEY).await.unwrap().is_some());

    let chat = store.load_chat(&index.current_chat_id).await.unwrap();
    assert_eq!(chat.provider, "OllamaLocal");
    assert_eq!(store.load_index().await.unwrap(), index);
}

#[tokio::test]
async fn test_chat_round_trip() {
    let (_backend, store) = memory_store("OllamaLocal");
    let mut chat = Chat::new("PizzaGPT", "Be kind.").named("Pizza");
    let mut pair = MessagePair::with_files("what's in this?", vec!["menu.png".into()]);
    pair.finish(Some("Margherita"));
    chat.push_pair(pair).unwrap();
    chat.options.creativity = Some(0.2);

    store.save_chat(&chat).await.unwrap();
    assert_eq!(store.load_chat(&chat.id).await.unwrap(), chat);

    // Unknown ids load as an empty chat under that id
    let missing = store.load_chat("does-not-exist").await.unwrap();
    assert_eq!(missing.id, "does-not-exist");
    assert!(missing.messages.is_empty());
}

#[tokio::test]
async fn test_deleting_only_chat_leaves_a_fresh_one() {
    let (backend, store) = memory_store("OllamaLocal");
    let index = store.load_index().await.unwrap();
    let only = index.current_chat_id.clone();

    let next = store.delete_chat(&index, &only).await.unwrap();
    assert_eq!(next.chats.len(), 1);
    assert_ne!(next.current_chat_id, only);
    assert!(next.contains(&next.current_chat_id));
    assert_eq!(backend.read(&store.chat_key(&only)).await.unwrap(), None);
    assert_eq!(chat_record_count(backend.as_ref()).await, 1);
}

#[tokio::test]
async fn test_deleting_current_moves_pointer() {
    let (_backend, store) = memory_store("OllamaLocal");
    let mut index = store.load_index().await.unwrap();
    let first = index.current_chat_id.clone();
    let second = Chat::new("OllamaLocal", "");
    let third = Chat::new("OllamaLocal", "");
    index = store.add_chat(&index, &second).await.unwrap();
    index = store.add_chat(&index, &third).await.unwrap();
    assert_eq!(index.current_chat_id, third.id);

    let snapshot = index.clone();
    let next = store.delete_chat(&index, &third.id).await.unwrap();
    assert_eq!(next.current_chat_id, second.id);
    assert_eq!(next.ids(), vec![first, second.id.clone()]);
    // The caller's snapshot is untouched
    assert_eq!(index, snapshot);
    assert_eq!(store.load_index().await.unwrap(), next);
}

#[tokio::test]
async fn test_prune_after_clear_leaves_no_chat_records() {
    let (backend, store) = memory_store("OllamaLocal");
    let mut index = store.load_index().await.unwrap();
    for _ in 0..3 {
        index = store.add_chat(&index, &Chat::new("OllamaLocal", "")).await.unwrap();
    }
    backend.write("someone_elses_key", "keep me").await.unwrap();
    assert_eq!(chat_record_count(backend.as_ref()).await, 4);

    let pruned = store.prune_orphans(&[]).await.unwrap();
    assert_eq!(pruned, 4);
    assert_eq!(chat_record_count(backend.as_ref()).await, 0);
    assert!(backend.read("someone_elses_key").await.unwrap().is_some());
}

#[tokio::test]
async fn test_dangling_pointer_is_repaired() {
    let (backend, store) = memory_store("OllamaLocal");
    let chat = Chat::new("OllamaLocal", "");
    let broken = ChatIndex {
        current_chat_id: "ghost".into(),
        chats: vec![chat.lite()],
    };
    store.save_index(&broken).await.unwrap();

    let index = store.load_index().await.unwrap();
    assert!(index.contains("ghost"));
    assert_eq!(index.chats.len(), 2);
    assert!(backend.read(&store.chat_key("ghost")).await.unwrap().is_some());
}

#[tokio::test]
async fn test_file_backed_store() {
    let dir = tempfile::tempdir().unwrap();
    let backend = Arc::new(FileStore::open(dir.path()).await.unwrap());
    let store = ConversationStore::new(backend.clone(), "OllamaLocal")
        .with_keys("test_chat_", "test_index");

    let index = store.load_index().await.unwrap();
    let mut chat = store.load_chat(&index.current_chat_id).await.unwrap();
    let mut pair = MessagePair::new("ping");
    pair.finish(Some("pong"));
    chat.push_pair(pair).unwrap();
    store.save_chat(&chat).await.unwrap();

    // A second store over the same directory sees the same data
    let reopened = ConversationStore::new(Arc::new(FileStore::open(dir.path()).await.unwrap()), "x")
        .with_keys("test_chat_", "test_index");
    assert_eq!(reopened.load_index().await.unwrap(), index);
    assert_eq!(reopened.load_chat(&chat.id).await.unwrap(), chat);

    let keys = backend.list_keys().await.unwrap();
    assert_eq!(keys.len(), 2);
    assert!(keys.contains(&"test_index".to_string()));
}

#[tokio::test]
async fn test_corrupt_index_keeps_stored_chats() {
    let (backend, store) = memory_store("OllamaLocal");
    let mut index = store.load_index().await.unwrap();
    let mut ids = vec![index.current_chat_id.clone()];
    for name in ["one", "two", "three"] {
        let chat = Chat::new("OllamaLocal", "").named(name);
        ids.push(chat.id.clone());
        index = store.add_chat(&index, &chat).await.unwrap();
    }
    backend.write(DEFAULT_INDEX_KEY, "{broken").await.unwrap();

    let rebuilt = store.load_index().await.unwrap();
    for id in &ids {
        assert!(backend.read(&store.chat_key(id)).await.unwrap().is_some());
    }
    assert_eq!(rebuilt.ids(), ids);
    assert_eq!(rebuilt.current_chat_id, ids[3]);
    assert_eq!(rebuilt.chats[3].name, "three");
    assert_eq!(store.load_index().await.unwrap(), rebuilt);
}

#[tokio::test]
async fn test_deleting_last_chat_touches_only_its_record() {
    let (backend, store) = memory_store("OllamaLocal");
    let index = store.load_index().await.unwrap();
    let orphan = Chat::new("OllamaLocal", "");
    store.save_chat(&orphan).await.unwrap();

    let next = store.delete_chat(&index, &index.current_chat_id).await.unwrap();
    assert_eq!(next.chats.len(), 1);
    assert!(backend.read(&store.chat_key(&orphan.id)).await.unwrap().is_some());
    assert_eq!(chat_record_count(backend.as_ref()).await, 2);
}
