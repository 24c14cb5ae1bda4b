//! 审核管道集成测试
//!
//! 从扫描到修改、记录和恢复的完整流程

use std::rc::Rc;
use std::time::Duration;

use futures::{poll, FutureExt};
use tokio::sync::Notify;
use tokio::time::sleep;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use socio_shield::moderation::config::constants;
use socio_shield::moderation::core::{DomMutator, Mutation, OfflineClassifier};
use socio_shield::moderation::pipeline::{ItemOutcome, SkipReason, WorkItem};
use socio_shield::moderation::storage::{EntryType, MemoryStore, RedbStore, SettingsStore};
use socio_shield::moderation::{ControlMessage, ControlResponse, ModerationPipeline, Verdict};
use socio_shield::parsers::html::dom;

mod common;

use common::{test_config, HtmlTestHelper, MockClassifier, TestEnvironment, PAGE_URL};

const PROFANE_MEDIUM: &str = "What the fucking hell is happening today";

#[tokio::test]
async fn test_each_element_is_classified_once() {
    let mock = MockClassifier::keep_all();
    let calls = mock.calls();
    let env = TestEnvironment::new(
        "<p>first paragraph</p><p>second paragraph</p><img src=\"https://cdn.example.com/a.png\">",
        test_config(),
        mock,
    );

    let report = env.pipeline.scan();
    assert_eq!(report.text_enqueued, 2);
    assert_eq!(report.images_enqueued, 1);

    let again = env.pipeline.scan();
    assert_eq!(again.enqueued(), 0);
    assert_eq!(env.pipeline.context().queue_len(), 3);

    env.pipeline.drain().await;
    env.pipeline.scan();
    env.pipeline.drain().await;

    assert_eq!(calls.get(), 3);
    assert_eq!(env.pipeline.context().queue_len(), 0);
}

#[tokio::test]
async fn test_profane_medium_text_is_redacted_locally() {
    let remote = MockClassifier::keep_all();
    let remote_calls = remote.calls();
    let env = TestEnvironment::layered(
        &format!("<p>{}</p>", PROFANE_MEDIUM),
        test_config(),
        remote,
    );

    env.scan_and_drain().await;

    let p = HtmlTestHelper::first(&env.document, "p");
    assert_eq!(
        dom::text_content(&p),
        "What the f [Content filtered] ning today"
    );
    assert!(dom::has_class(&p, constants::FILTERED_TEXT_CLASS));
    assert_eq!(remote_calls.get(), 0);

    let history = env.pipeline.history();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].entry_type, EntryType::Text);
    assert_eq!(history[0].original_content, PROFANE_MEDIUM);
    assert_eq!(history[0].reasons, vec!["local detection".to_string()]);
    assert_eq!(history[0].page_url, PAGE_URL);
    assert_eq!(history[0].domain, "forum.example.com");

    assert_eq!(env.pipeline.stats().text_filtered, 1);
    assert_eq!(env.store.counter(constants::KEY_TEXT_FILTERED).unwrap(), 1);
    assert_eq!(env.store.history().unwrap().len(), 1);

    let indicators = env.document.elements_with_class(constants::INDICATOR_CLASS);
    assert_eq!(indicators.len(), 1);
    assert_eq!(
        dom::next_sibling(&p).map(|node| dom::node_key(&node)),
        Some(dom::node_key(&indicators[0]))
    );
}

#[tokio::test]
async fn test_explicit_image_falls_back_to_blur() {
    let src = "https://cdn.example.com/xxx/photo.jpg";
    let env = TestEnvironment::offline(&format!("<div><img src=\"{}\"></div>", src));

    env.scan_and_drain().await;

    let img = HtmlTestHelper::first(&env.document, "img");
    let wrapper = dom::get_parent_node(&img).unwrap();
    assert!(dom::has_class(&wrapper, constants::BLUR_WRAPPER_CLASS));
    assert!(dom::has_class(&img, constants::BLURRED_IMAGE_CLASS));
    assert_eq!(
        dom::get_style_property(&img, "filter").as_deref(),
        Some(constants::BLUR_FILTER)
    );

    let overlays = env.document.elements_with_class(constants::BLUR_OVERLAY_CLASS);
    assert_eq!(overlays.len(), 1);

    let history = env.pipeline.history();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].entry_type, EntryType::Image);
    assert_eq!(history[0].original_content, src);
    assert_eq!(env.pipeline.stats().images_filtered, 1);
    assert_eq!(env.store.counter(constants::KEY_IMAGES_FILTERED).unwrap(), 1);

    // 点击遮罩来回切换
    let overlay = &overlays[0];
    assert_eq!(env.document.click(overlay), 1);
    assert_eq!(dom::get_style_property(&img, "filter").as_deref(), Some("none"));
    assert_eq!(dom::get_style_property(overlay, "opacity").as_deref(), Some("0"));

    env.document.click(overlay);
    assert_eq!(
        dom::get_style_property(&img, "filter").as_deref(),
        Some(constants::BLUR_FILTER)
    );
    assert_eq!(dom::get_style_property(overlay, "opacity").as_deref(), Some("1"));
}

#[tokio::test]
async fn test_blur_is_idempotent() {
    let env = TestEnvironment::new(
        "<img src=\"https://cdn.example.com/a.png\">",
        test_config(),
        MockClassifier::keep_all(),
    );
    let img = HtmlTestHelper::first(&env.document, "img");
    let mutator = DomMutator::new(env.document.clone(), Duration::from_secs(3));
    let item = WorkItem::image(img.clone());
    let verdict = Verdict::blur(vec!["nudity".into()]);

    let first = mutator.apply(env.pipeline.context(), &item, &verdict).unwrap();
    let second = mutator.apply(env.pipeline.context(), &item, &verdict).unwrap();

    assert!(matches!(first, Mutation::ImageBlurred { .. }));
    assert_eq!(second, Mutation::AlreadyApplied);
    assert_eq!(
        env.document.elements_with_class(constants::BLUR_WRAPPER_CLASS).len(),
        1
    );
    assert_eq!(
        env.document.elements_with_class(constants::BLUR_OVERLAY_CLASS).len(),
        1
    );
    assert_eq!(env.document.listener_count(), 1);
}

#[tokio::test]
async fn test_only_one_batch_in_flight() {
    let gate = Rc::new(Notify::new());
    let mock = MockClassifier::keep_all().with_gate(gate.clone());
    let calls = mock.calls();
    let body: String = (0..7).map(|n| format!("<p>paragraph {}</p>", n)).collect();
    let env = TestEnvironment::new(&body, test_config(), mock);

    env.pipeline.scan();
    let mut first = Box::pin(env.pipeline.run_batch());
    assert!(poll!(&mut first).is_pending());
    assert!(env.pipeline.context().is_in_flight());
    assert_eq!(calls.get(), 5);

    // 第二个批次不能启动，队列不变
    assert!(matches!(env.pipeline.run_batch().now_or_never(), Some(None)));
    assert_eq!(env.pipeline.context().queue_len(), 2);

    gate.notify_waiters();
    let report = first.await.expect("batch ran");
    assert_eq!(report.dispatched, 5);
    assert_eq!(report.remaining, 2);
    assert!(!env.pipeline.context().is_in_flight());
}

#[tokio::test]
async fn test_unknown_backend_action_keeps_content() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/analyze_text"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!({"action": "quarantine"})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let config = socio_shield::ModerationConfig {
        backend_url: server.uri(),
        ..test_config()
    };
    let document = HtmlTestHelper::document("<p>a perfectly ordinary sentence</p>");
    let pipeline = ModerationPipeline::from_config(config, document.clone()).unwrap();

    pipeline.scan();
    pipeline.drain().await;

    let p = HtmlTestHelper::first(&document, "p");
    assert_eq!(dom::text_content(&p), "a perfectly ordinary sentence");
    assert!(pipeline.history().is_empty());
}

#[tokio::test]
async fn test_benign_text_is_kept() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/analyze_text"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({"action": "keep", "reasons": []})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let config = socio_shield::ModerationConfig {
        backend_url: server.uri(),
        ..test_config()
    };
    let document = HtmlTestHelper::document("<p>this is fine</p>");
    let pipeline = ModerationPipeline::from_config(config, document.clone()).unwrap();

    pipeline.scan();
    let summary = pipeline.drain().await;

    assert_eq!(summary.dispatched, 1);
    assert_eq!(summary.redacted, 0);
    let p = HtmlTestHelper::first(&document, "p");
    assert_eq!(dom::text_content(&p), "this is fine");
    assert!(!dom::has_class(&p, constants::FILTERED_TEXT_CLASS));
    assert!(pipeline.history().is_empty());
    assert_eq!(pipeline.stats().text_filtered, 0);
}

#[tokio::test]
async fn test_backend_failure_leaves_element_marked() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/analyze_text"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
        .mount(&server)
        .await;

    let config = socio_shield::ModerationConfig {
        backend_url: server.uri(),
        ..test_config()
    };
    let document = HtmlTestHelper::document("<p>some neutral words</p>");
    let pipeline = ModerationPipeline::from_config(config, document.clone()).unwrap();

    pipeline.scan();
    let summary = pipeline.drain().await;
    assert_eq!(summary.failed, 1);

    let p = HtmlTestHelper::first(&document, "p");
    assert!(dom::has_class(&p, constants::PROCESSED_CLASS));
    assert_eq!(dom::text_content(&p), "some neutral words");
    assert_eq!(pipeline.scan().enqueued(), 0);
}

#[tokio::test]
async fn test_history_keeps_newest_hundred() {
    let body: String = (0..105).map(|n| format!("<p>item {}</p>", n)).collect();
    let config = socio_shield::ModerationConfig {
        batch_size: 50,
        ..test_config()
    };
    let env = TestEnvironment::new(
        &body,
        config,
        MockClassifier::new(Verdict::redact(vec!["spam".into()]), Verdict::keep()),
    );

    env.scan_and_drain().await;

    let history = env.pipeline.history();
    assert_eq!(history.len(), 100);
    assert_eq!(history[0].original_content, "item 104");
    assert!(history.iter().all(|entry| entry.original_content != "item 0"));
    assert_eq!(env.pipeline.stats().text_filtered, 105);
    assert_eq!(env.store.history().unwrap().len(), 100);
    assert_eq!(env.store.counter(constants::KEY_TEXT_FILTERED).unwrap(), 105);
}

#[tokio::test]
async fn test_disable_restores_page() {
    let original = "<div id=\"post\"><p>secret plans</p><img src=\"https://cdn.example.com/a.png\"></div>";
    let env = TestEnvironment::new(
        original,
        test_config(),
        MockClassifier::new(
            Verdict::encrypt("[encrypted]".to_string(), vec!["pii".into()]),
            Verdict::blur(vec!["nudity".into()]),
        ),
    );

    env.scan_and_drain().await;

    let p = HtmlTestHelper::first(&env.document, "p");
    let img = HtmlTestHelper::first(&env.document, "img");
    assert_eq!(dom::text_content(&p), "[encrypted]");
    assert_eq!(env.pipeline.encrypted_content(), "[encrypted]");
    assert_eq!(env.pipeline.context().encrypted_count(), 1);

    let response = env
        .pipeline
        .handle_message(ControlMessage::ToggleProtection { enabled: false });
    assert_eq!(response, ControlResponse::Toggled { success: true });

    assert_eq!(dom::text_content(&p), "secret plans");
    assert!(!dom::has_class(&p, constants::ENCRYPTED_CLASS));
    assert_eq!(env.pipeline.context().encrypted_count(), 0);

    assert_eq!(dom::get_style_property(&img, "filter"), None);
    assert!(!dom::has_class(&img, constants::BLURRED_IMAGE_CLASS));
    let parent = dom::get_parent_node(&img).unwrap();
    assert_eq!(dom::get_node_attr(&parent, "id").as_deref(), Some("post"));

    let html = env.document.to_html();
    assert!(!html.contains(constants::BLUR_WRAPPER_CLASS));
    assert!(!html.contains(constants::BLUR_OVERLAY_CLASS));
    assert!(!html.contains(constants::INDICATOR_CLASS));

    // 历史保留
    assert_eq!(env.pipeline.history().len(), 2);
    assert_eq!(env.store.enabled().unwrap(), Some(false));
}

#[tokio::test]
async fn test_blocked_image_comes_back_on_disable() {
    let env = TestEnvironment::new(
        "<div id=\"gallery\"><img src=\"https://cdn.example.com/a.png\" width=\"300\" height=\"200\"></div>",
        test_config(),
        MockClassifier::new(Verdict::keep(), Verdict::block(vec!["gore".into()])),
    );

    let img = HtmlTestHelper::first(&env.document, "img");
    env.scan_and_drain().await;

    assert!(!env.document.is_attached(&img));
    let notices = env.document.elements_with_class(constants::BLOCKED_NOTICE_CLASS);
    assert_eq!(notices.len(), 1);
    assert!(dom::text_content(&notices[0]).contains(constants::BLOCKED_NOTICE));

    env.pipeline.set_enabled(false);

    assert!(env.document.is_attached(&img));
    assert!(env
        .document
        .elements_with_class(constants::BLOCKED_NOTICE_CLASS)
        .is_empty());
}

#[tokio::test]
async fn test_recovered_content_round_trip() {
    let env = TestEnvironment::offline(&format!("<p>{}</p><p>untouched</p>", PROFANE_MEDIUM));
    env.scan_and_drain().await;

    let message =
        ControlMessage::parse(&format!(r#"{{"action":"applyRecoveredContent","text":"{}"}}"#, PROFANE_MEDIUM))
            .unwrap();
    let response = env.pipeline.handle_message(message.clone());
    assert_eq!(
        response,
        ControlResponse::Recovered {
            success: true,
            restored: true
        }
    );

    let p = HtmlTestHelper::first(&env.document, "p");
    assert_eq!(dom::text_content(&p), PROFANE_MEDIUM);
    assert!(!dom::has_class(&p, constants::FILTERED_TEXT_CLASS));

    // 没有剩余目标时显示通知
    let response = env.pipeline.handle_message(message);
    assert_eq!(
        response,
        ControlResponse::Recovered {
            success: true,
            restored: false
        }
    );
    let notifications = env.document.elements_with_class(constants::NOTIFICATION_CLASS);
    assert_eq!(notifications.len(), 1);
    assert!(dom::text_content(&notifications[0]).starts_with("Recovered content:"));
}

#[tokio::test]
async fn test_recovering_encrypted_text_clears_encrypted_state() {
    let env = TestEnvironment::new(
        "<p>call 555-1234</p>",
        test_config(),
        MockClassifier::new(
            Verdict::encrypt("*****".to_string(), vec!["pii".into()]),
            Verdict::keep(),
        ),
    );
    env.scan_and_drain().await;

    let p = HtmlTestHelper::first(&env.document, "p");
    assert_eq!(dom::text_content(&p), "*****");
    assert_eq!(env.pipeline.context().encrypted_count(), 1);

    let response = env.pipeline.handle_message(ControlMessage::ApplyRecoveredContent {
        text: "call 555-1234".to_string(),
    });
    assert_eq!(
        response,
        ControlResponse::Recovered {
            success: true,
            restored: true
        }
    );

    assert_eq!(dom::text_content(&p), "call 555-1234");
    assert!(!dom::has_class(&p, constants::ENCRYPTED_CLASS));
    assert_eq!(env.pipeline.context().encrypted_count(), 0);
    assert_eq!(env.pipeline.encrypted_content(), "");

    // 关闭保护不会覆盖已恢复的文本
    env.pipeline.set_enabled(false);
    assert_eq!(dom::text_content(&p), "call 555-1234");
}

#[tokio::test]
async fn test_unblur_keeps_data_url_style_intact() {
    let style = "background-image: url(data:image/png;base64,AAAA); width: 10px";
    let env = TestEnvironment::new(
        &format!(
            "<div><img src=\"https://cdn.example.com/a.png\" style=\"{}\"></div>",
            style
        ),
        test_config(),
        MockClassifier::new(Verdict::keep(), Verdict::blur(vec!["nudity".into()])),
    );
    env.scan_and_drain().await;

    let img = HtmlTestHelper::first(&env.document, "img");
    assert_eq!(
        dom::get_style_property(&img, "filter").as_deref(),
        Some(constants::BLUR_FILTER)
    );
    assert_eq!(
        dom::get_style_property(&img, "background-image").as_deref(),
        Some("url(data:image/png;base64,AAAA)")
    );

    env.pipeline.set_enabled(false);

    assert_eq!(dom::get_node_attr(&img, "style").as_deref(), Some(style));
}

#[tokio::test]
async fn test_status_message() {
    let env = TestEnvironment::new(
        "<p>one</p><p>two</p>",
        test_config(),
        MockClassifier::keep_all(),
    );
    env.pipeline.scan();

    let response = env
        .pipeline
        .handle_message(ControlMessage::parse(r#"{"action":"getStatus"}"#).unwrap());
    assert_eq!(
        response.to_json().unwrap(),
        r#"{"isEnabled":true,"elementsScanned":2,"queueLength":2}"#
    );
}

#[tokio::test]
async fn test_detached_element_is_skipped() {
    let mock = MockClassifier::keep_all();
    let calls = mock.calls();
    let env = TestEnvironment::new("<p>going away</p>", test_config(), mock);

    env.pipeline.scan();
    let p = HtmlTestHelper::first(&env.document, "p");
    assert!(env.document.remove(&p));

    let outcome = env.pipeline.process_item(WorkItem::text(p)).await;
    assert!(matches!(outcome, ItemOutcome::Skipped(SkipReason::Detached)));

    env.pipeline.drain().await;
    assert_eq!(calls.get(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_lazy_image_without_size_times_out() {
    let mock = MockClassifier::keep_all();
    let calls = mock.calls();
    let env = TestEnvironment::new(
        "<img src=\"https://cdn.example.com/lazy.png\" loading=\"lazy\">",
        test_config(),
        mock,
    );
    let img = HtmlTestHelper::first(&env.document, "img");

    let outcome = env.pipeline.process_item(WorkItem::image(img)).await;
    assert!(matches!(outcome, ItemOutcome::Skipped(SkipReason::ImageNotReady)));
    assert_eq!(calls.get(), 0);
}

#[tokio::test]
async fn test_disabled_store_state_wins() {
    let store = Rc::new(MemoryStore::new());
    store.set_enabled(false).unwrap();
    let env = TestEnvironment::with_store(
        "<p>text</p>",
        test_config(),
        MockClassifier::keep_all(),
        store,
    );

    assert!(!env.pipeline.is_enabled());
    assert_eq!(env.pipeline.scan().enqueued(), 0);

    env.pipeline.set_enabled(true);
    assert_eq!(env.pipeline.context().queue_len(), 1);
}

#[tokio::test]
async fn test_state_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("settings.redb");
    let config = test_config();

    {
        let document = HtmlTestHelper::document(&format!("<p>{}</p>", PROFANE_MEDIUM));
        let pipeline = ModerationPipeline::new(
            config.clone(),
            document,
            Box::new(socio_shield::moderation::core::LayeredClassifier::new(
                socio_shield::moderation::core::HeuristicClassifier::from_config(&config).unwrap(),
                Box::new(OfflineClassifier),
                true,
            )),
            Box::new(RedbStore::open(&path).unwrap()),
        );
        pipeline.scan();
        pipeline.drain().await;
        pipeline.set_enabled(false);
    }

    let pipeline = ModerationPipeline::new(
        config,
        HtmlTestHelper::document("<p>later</p>"),
        Box::new(MockClassifier::keep_all()),
        Box::new(RedbStore::open(&path).unwrap()),
    );
    assert!(!pipeline.is_enabled());
    assert_eq!(pipeline.history().len(), 1);
    assert_eq!(pipeline.stats().text_filtered, 1);
}

#[tokio::test(start_paused = true)]
async fn test_run_loop_picks_up_late_content() {
    let mock = MockClassifier::keep_all();
    let calls = mock.calls();
    let env = TestEnvironment::new("<p>initial</p>", test_config(), mock);

    let driver = async {
        sleep(Duration::from_millis(100)).await;
        assert_eq!(calls.get(), 1);

        let body = env.document.body().unwrap();
        let p = dom::create_element("p", &[]);
        dom::append_child(&p, &dom::create_text("late arrival"));
        env.document.append_child(&body, &p);

        sleep(Duration::from_secs(2)).await;
        env.pipeline.stop();
    };

    tokio::join!(env.pipeline.run(), driver);

    assert_eq!(calls.get(), 2);
    assert_eq!(env.document.subscriber_count(), 0);
}
