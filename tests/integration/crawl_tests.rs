//! Integration tests for the crawler
//!
//! These tests use wiremock to serve a small phpBB-like board and run the
//! full crawl cycle end-to-end into a SQLite store.

use forum_archiver::config::{Config, CrawlerConfig, OutputConfig, UserAgentConfig};
use forum_archiver::crawler::{crawl, Fetched, Fetcher, HttpFetcher};
use forum_archiver::record::{Item, Key, Record};
use forum_archiver::storage::{open_storage, RecordStore, SqliteStorage};
use forum_archiver::ArchiverError;
use std::sync::Arc;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Creates a test configuration pointing at the mock board
fn create_test_config(base_url: &str, db_path: &str) -> Config {
    Config {
        crawler: CrawlerConfig {
            base_url: base_url.to_string(),
            max_concurrent_fetches: 4,
            request_timeout_secs: 5,
        },
        user_agent: UserAgentConfig {
            crawler_name: "TestArchiver".to_string(),
            crawler_version: "1.0.0".to_string(),
            contact_url: "https://example.com/contact".to_string(),
            contact_email: "test@example.com".to_string(),
        },
        output: OutputConfig {
            database_path: db_path.to_string(),
            chunks_dir: "./chunks".to_string(),
            chunk_size: 512 * 1024,
        },
    }
}

fn html(status: u16, body: String) -> ResponseTemplate {
    ResponseTemplate::new(status)
        .set_body_string(body)
        .insert_header("content-type", "text/html; charset=UTF-8")
}

fn board_index() -> String {
    r#"<html><body><h1>Test Board</h1>
<ul class="topiclist"><li class="header"><dl><dt><div class="list-inner">General</div></dt></dl></li></ul>
<ul class="topiclist forums">
  <li class="row"><dl><dt><div class="list-inner">
    <a href="./viewforum.php?f=1" class="forumtitle">Chat</a><br />Talk here
  </div></dt></dl></li>
  <li class="row"><dl><dt><div class="list-inner">
    <a href="./viewforum.php?f=3" class="forumtitle">Old board</a><br />Moved away
  </div></dt></dl></li>
</ul></body></html>"#
        .to_string()
}

fn chat_forum() -> String {
    r#"<html><body><h2 class="forum-title"><a href="./viewforum.php?f=1">Chat</a></h2>
<ul class="topiclist"><li class="header"><dl><dt><div class="list-inner">Topics</div></dt></dl></li></ul>
<ul class="topiclist topics">
  <li class="row bg1"><dl><dt><div class="list-inner">
    <a href="./viewtopic.php?f=1&amp;t=5" class="topictitle">Hello</a><br />
    <div class="topic-poster">by <a href="./memberlist.php?mode=viewprofile&amp;u=2" class="username">alice</a>
      <time datetime="2019-05-01T10:00:00+00:00">May 1</time></div>
  </div></dt></dl></li>
</ul></body></html>"#
        .to_string()
}

fn topic_page(ids: &[u64], next: Option<&str>) -> String {
    let posts: String = ids
        .iter()
        .map(|id| {
            format!(
                r##"<div id="p{id}" class="post bg1"><div class="postbody"><div id="post_content{id}">
<h3><a href="#p{id}">Post {id}</a></h3>
<p class="author">by <span class="username">guest</span> <time datetime="2019-05-01T10:00:00+00:00">May 1</time></p>
<div class="content">Message <div class="quote">{id}</div></div>
</div></div></div>"##,
                id = id
            )
        })
        .collect();
    let pagination = next
        .map(|href| format!(r#"<ul><li class="arrow next"><a href="{}">Next</a></li></ul>"#, href))
        .unwrap_or_default();
    format!("<html><body>{}{}</body></html>", posts, pagination)
}

/// Mounts the sample board; every page is expected to be requested exactly once
async fn mount_board(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html(200, board_index()))
        .expect(1)
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/viewforum.php"))
        .and(query_param("f", "1"))
        .respond_with(html(200, chat_forum()))
        .expect(1)
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/viewforum.php"))
        .and(query_param("f", "3"))
        .respond_with(ResponseTemplate::new(301).insert_header("Location", "/archive/old/"))
        .expect(1)
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/archive/old/"))
        .respond_with(html(200, "<html><body>old</body></html>".to_string()))
        .expect(1)
        .mount(server)
        .await;

    // Mounted before page 1 so the more specific match wins
    Mock::given(method("GET"))
        .and(path("/viewtopic.php"))
        .and(query_param("t", "5"))
        .and(query_param("start", "2"))
        .respond_with(html(200, topic_page(&[12], None)))
        .expect(1)
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/viewtopic.php"))
        .and(query_param("t", "5"))
        .respond_with(html(
            200,
            topic_page(&[10, 11], Some("./viewtopic.php?f=1&amp;t=5&amp;start=2")),
        ))
        .expect(1)
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_full_crawl_into_sqlite() {
    let mock_server = MockServer::start().await;
    mount_board(&mock_server).await;
    let base_url = format!("{}/", mock_server.uri());

    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("board.sqlite");
    let config = create_test_config(&base_url, db_path.to_str().unwrap());
    let storage = Arc::new(open_storage(&db_path).unwrap());

    let summary = crawl(&config, storage.clone()).await.unwrap();
    assert_eq!(summary.forums_written, 2);
    assert_eq!(summary.topics_written, 1);
    // A redirect chain counts as one fetch
    assert_eq!(summary.requests, 5);

    assert_eq!(storage.len().unwrap(), 3);
    let root = storage.get(&Key::root()).unwrap().unwrap();
    let Record::Forum { title, items } = root else {
        panic!("root should be a forum record");
    };
    assert_eq!(title, "Test Board");
    assert_eq!(items.len(), 3);
    assert_eq!(
        items[2],
        Item::Redirect {
            title: "Old board".to_string(),
            description: Some("Moved away".to_string()),
            target_url: format!("{}archive/old/", base_url),
        }
    );

    let Record::Topic { items: posts } = storage.get(&Key::topic(1, 5)).unwrap().unwrap() else {
        panic!("f1t5 should be a topic record");
    };
    let ids: Vec<u64> = posts.iter().map(|p| p.post_id).collect();
    assert_eq!(ids, vec![10, 11, 12]);
    assert_eq!(posts[0].content.trim(), r#"Message <div class="quote">10</div>"#);

    let Record::Forum { items: topics, .. } = storage.get(&Key::forum(1)).unwrap().unwrap() else {
        panic!("f1 should be a forum record");
    };
    match &topics[1] {
        Item::Topic {
            user_id, user_name, ..
        } => {
            assert_eq!(*user_id, 2);
            assert_eq!(user_name, "alice");
        }
        other => panic!("expected a topic item, got {:?}", other),
    }
}

#[tokio::test]
async fn test_second_run_makes_no_requests() {
    let mock_server = MockServer::start().await;
    mount_board(&mock_server).await;
    let base_url = format!("{}/", mock_server.uri());

    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("board.sqlite");
    let config = create_test_config(&base_url, db_path.to_str().unwrap());

    let storage = Arc::new(open_storage(&db_path).unwrap());
    crawl(&config, storage.clone()).await.unwrap();
    drop(storage);

    let before = mock_server.received_requests().await.unwrap().len();

    // Reopen from disk, as a fresh process would
    let storage = Arc::new(SqliteStorage::new(&db_path).unwrap());
    let summary = crawl(&config, storage.clone()).await.unwrap();

    let after = mock_server.received_requests().await.unwrap().len();
    assert_eq!(before, after);
    assert_eq!(summary.requests, 0);
    assert_eq!(storage.len().unwrap(), 3);
}

#[tokio::test]
async fn test_server_error_aborts_crawl() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html(200, board_index()))
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/viewforum.php"))
        .and(query_param("f", "1"))
        .respond_with(html(200, chat_forum()))
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/viewforum.php"))
        .and(query_param("f", "3"))
        .respond_with(html(200, "<html><body><h1>Old</h1></body></html>".to_string()))
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/viewtopic.php"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&mock_server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("board.sqlite");
    let config = create_test_config(&format!("{}/", mock_server.uri()), db_path.to_str().unwrap());
    let storage = Arc::new(open_storage(&db_path).unwrap());

    let err = crawl(&config, storage.clone()).await.unwrap_err();
    assert!(matches!(err, ArchiverError::Transport { .. }), "{:?}", err);
    assert!(!storage.contains(&Key::root()).unwrap());
    assert!(!storage.contains(&Key::forum(1)).unwrap());
}

#[tokio::test]
async fn test_http_fetcher_outcomes() {
    let mock_server = MockServer::start().await;
    let base = mock_server.uri();

    Mock::given(method("GET"))
        .and(path("/page"))
        .respond_with(html(200, "<p>hi</p>".to_string()))
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/hop1"))
        .respond_with(ResponseTemplate::new(302).insert_header("Location", "/hop2"))
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/hop2"))
        .respond_with(ResponseTemplate::new(301).insert_header("Location", "/page"))
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/loop"))
        .respond_with(ResponseTemplate::new(302).insert_header("Location", "/loop"))
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/missing"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/moved"))
        .respond_with(ResponseTemplate::new(301).insert_header("Location", "/missing"))
        .mount(&mock_server)
        .await;

    let config = create_test_config(&format!("{}/", base), "unused.sqlite");
    let fetcher = HttpFetcher::from_config(&config.user_agent, &config.crawler).unwrap();

    assert_eq!(
        fetcher.fetch(&format!("{}/page", base)).await.unwrap(),
        Fetched::Page("<p>hi</p>".to_string())
    );
    assert_eq!(
        fetcher.fetch(&format!("{}/hop1", base)).await.unwrap(),
        Fetched::Redirect(format!("{}/page", base))
    );
    assert!(matches!(
        fetcher.fetch(&format!("{}/loop", base)).await,
        Err(ArchiverError::Transport { .. })
    ));
    assert!(matches!(
        fetcher.fetch(&format!("{}/missing", base)).await,
        Err(ArchiverError::Transport { .. })
    ));
    assert_eq!(
        fetcher.fetch(&format!("{}/moved", base)).await.unwrap(),
        Fetched::Redirect(format!("{}/missing", base))
    );
}

#[tokio::test]
async fn test_forum_redirect_to_dead_page_is_kept_as_link() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html(200, board_index()))
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/viewforum.php"))
        .and(query_param("f", "1"))
        .respond_with(html(200, chat_forum()))
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/viewforum.php"))
        .and(query_param("f", "3"))
        .respond_with(ResponseTemplate::new(301).insert_header("Location", "/gone/"))
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/gone/"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/viewtopic.php"))
        .respond_with(html(200, topic_page(&[10], None)))
        .mount(&mock_server)
        .await;

    let base_url = format!("{}/", mock_server.uri());
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("board.sqlite");
    let config = create_test_config(&base_url, db_path.to_str().unwrap());
    let storage = Arc::new(open_storage(&db_path).unwrap());

    crawl(&config, storage.clone()).await.unwrap();

    let Record::Forum { items, .. } = storage.get(&Key::root()).unwrap().unwrap() else {
        panic!("root should be a forum record");
    };
    assert_eq!(
        items[2],
        Item::Redirect {
            title: "Old board".to_string(),
            description: Some("Moved away".to_string()),
            target_url: format!("{}gone/", base_url),
        }
    );
    assert!(!storage.contains(&Key::forum(3)).unwrap());
}
