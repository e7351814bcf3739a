//! Integration tests for archive packing
//!
//! A SQLite store is filled with synthetic records, packed into a chunk
//! directory and read back through the index.

use forum_archiver::archive::{chunk_file_name, read_chunk, ChunkIndex, INDEX_FILE_NAME};
use forum_archiver::record::{Item, Key, Post, Record};
use forum_archiver::storage::{RecordStore, SqliteStorage};
use forum_archiver::{pack_store, ArchiveReader};
use std::collections::BTreeSet;
use std::path::Path;

/// Hex noise so the compressed stream grows steadily
fn noise(seed: u64, len: usize) -> String {
    let mut state = seed.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
    (0..len)
        .map(|_| {
            state = state
                .wrapping_mul(6364136223846793005)
                .wrapping_add(1442695040888963407);
            char::from_digit(((state >> 33) % 16) as u32, 16).unwrap_or('0')
        })
        .collect()
}

fn topic(id: u64) -> Record {
    Record::Topic {
        items: vec![Post {
            title: format!("Post {}", id),
            user_id: -1,
            user_name: "guest".to_string(),
            datetime: "2019-05-01T10:00:00+00:00".to_string(),
            post_id: id,
            content: format!("<div>{}</div>", noise(id, 600)),
        }],
    }
}

/// Root, one forum and `topics` topics, in insertion order
fn fill_store(storage: &SqliteStorage, topics: u64) -> Vec<Key> {
    let mut keys = Vec::new();
    for t in 1..=topics {
        let key = Key::topic(1, t);
        storage.put(&key, &topic(t)).unwrap();
        keys.push(key);
    }

    let forum = Record::Forum {
        title: "Chat".to_string(),
        items: (1..=topics)
            .map(|t| Item::Topic {
                title: format!("Topic {}", t),
                target_key: Key::topic(1, t),
                user_id: -1,
                user_name: "guest".to_string(),
                datetime: "2019-05-01T10:00:00+00:00".to_string(),
            })
            .collect(),
    };
    storage.put(&Key::forum(1), &forum).unwrap();
    keys.push(Key::forum(1));

    let root = Record::Forum {
        title: "Board".to_string(),
        items: vec![Item::Forum {
            title: "Chat".to_string(),
            description: "Talk".to_string(),
            target_key: Key::forum(1),
        }],
    };
    storage.put(&Key::root(), &root).unwrap();
    keys.push(Key::root());
    keys
}

fn chunk_keys(dir: &Path, id: u32) -> Vec<String> {
    read_chunk(&dir.join(chunk_file_name(id)))
        .unwrap()
        .keys()
        .cloned()
        .collect()
}

#[test]
fn test_pack_and_read_back() {
    let tmp = tempfile::tempdir().unwrap();
    let storage = SqliteStorage::new(&tmp.path().join("board.sqlite")).unwrap();
    let keys = fill_store(&storage, 600);
    let chunks_dir = tmp.path().join("chunks");

    let summary = pack_store(&storage, &chunks_dir, 16 * 1024).unwrap();
    assert_eq!(summary.records, keys.len());
    assert!(summary.chunks > 1, "expected several chunks, got {}", summary.chunks);

    let index = ChunkIndex::read_from(&chunks_dir.join(INDEX_FILE_NAME)).unwrap();
    assert_eq!(index.len(), keys.len());
    assert_eq!(index.chunk_count(), summary.chunks);

    // Chunk ids are contiguous and every chunk is non-empty
    let mut seen = BTreeSet::new();
    for id in 0..summary.chunks {
        let in_chunk = chunk_keys(&chunks_dir, id);
        assert!(!in_chunk.is_empty(), "chunk {} is empty", id);
        for key in in_chunk {
            assert_eq!(index.get(&key), Some(id), "{} indexed to the wrong chunk", key);
            assert!(seen.insert(key.clone()), "{} appears in two chunks", key);
        }
    }
    assert!(!chunks_dir.join(chunk_file_name(summary.chunks)).exists());
    let expected: BTreeSet<String> = keys.iter().map(|k| k.as_str().to_string()).collect();
    assert_eq!(seen, expected);

    // Chunks hold contiguous runs in store order
    let ids: Vec<u32> = keys.iter().map(|k| index.get(k.as_str()).unwrap()).collect();
    assert_eq!(ids[0], 0);
    assert!(ids.windows(2).all(|w| w[1] == w[0] || w[1] == w[0] + 1));

    let mut reader = ArchiveReader::open(&chunks_dir).unwrap();
    for key in [Key::root(), Key::forum(1), Key::topic(1, 1), Key::topic(1, 600)] {
        assert_eq!(
            reader.load(&key).unwrap(),
            storage.get(&key).unwrap(),
            "{} differs from the store",
            key
        );
    }
    assert_eq!(reader.load(&Key::topic(2, 1)).unwrap(), None);
}

#[test]
fn test_small_store_fits_one_chunk() {
    let tmp = tempfile::tempdir().unwrap();
    let storage = SqliteStorage::new(&tmp.path().join("board.sqlite")).unwrap();
    fill_store(&storage, 2);
    let chunks_dir = tmp.path().join("chunks");

    let summary = pack_store(&storage, &chunks_dir, 512 * 1024).unwrap();
    assert_eq!(summary.chunks, 1);
    assert_eq!(summary.records, 4);

    let index = ChunkIndex::read_from(&chunks_dir.join(INDEX_FILE_NAME)).unwrap();
    let mapped: Vec<(&str, u32)> = index.iter().collect();
    assert_eq!(
        mapped,
        vec![("f1", 0), ("f1t1", 0), ("f1t2", 0), ("root", 0)]
    );
}

#[test]
fn test_repack_after_overwrite_keeps_order() {
    let tmp = tempfile::tempdir().unwrap();
    let storage = SqliteStorage::new(&tmp.path().join("board.sqlite")).unwrap();
    let keys = fill_store(&storage, 3);
    let chunks_dir = tmp.path().join("chunks");
    pack_store(&storage, &chunks_dir, 512 * 1024).unwrap();

    // An idempotent rewrite of the first key must not move it to the end
    storage.put(&keys[0], &topic(99)).unwrap();
    pack_store(&storage, &chunks_dir, 512 * 1024).unwrap();

    let order: Vec<Key> = storage.entries().map(|entry| entry.unwrap().0).collect();
    assert_eq!(order, keys);
    assert_eq!(chunk_keys(&chunks_dir, 0).len(), keys.len());

    let mut reader = ArchiveReader::open(&chunks_dir).unwrap();
    assert_eq!(reader.load(&keys[0]).unwrap(), Some(topic(99)));
}

#[test]
fn test_empty_store_packs_to_empty_index() {
    let tmp = tempfile::tempdir().unwrap();
    let storage = SqliteStorage::new(&tmp.path().join("board.sqlite")).unwrap();
    let chunks_dir = tmp.path().join("chunks");

    let summary = pack_store(&storage, &chunks_dir, 512 * 1024).unwrap();
    assert_eq!(summary.records, 0);
    assert_eq!(summary.chunks, 0);

    let index = ChunkIndex::read_from(&chunks_dir.join(INDEX_FILE_NAME)).unwrap();
    assert!(index.is_empty());
    assert!(!chunks_dir.join(chunk_file_name(0)).exists());
}
