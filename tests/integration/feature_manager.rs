//! Integration tests for the feature lifecycle orchestrator

use crate::integration::test_utils::{manager, RecordingFactory, ScriptedChecker};
use pagewire::error::{FeatureError, OrchestratorError};
use pagewire::feature::TransitionOutcome;
use pagewire::types::FeatureKey;
use proptest::prelude::*;
use serde_json::json;
use std::time::Duration;

fn all_but(excluded: FeatureKey) -> Vec<FeatureKey> {
    FeatureKey::ACTIVATION_ORDER
        .iter()
        .copied()
        .filter(|key| *key != excluded)
        .collect()
}

#[tokio::test]
async fn test_denied_feature_stays_inactive_after_initialize() {
    let checker = ScriptedChecker::new();
    checker.deny(FeatureKey::Shortcut);
    let factory = RecordingFactory::new();
    let manager = manager(checker, factory.clone(), 100);

    let report = manager.initialize().await.unwrap().unwrap();

    assert_eq!(manager.active_features(), all_but(FeatureKey::Shortcut));
    assert_eq!(report.pass, 1);
    assert_eq!(report.reasons, vec!["initialize".to_string()]);
    assert_eq!(
        report.outcome_for(FeatureKey::Shortcut),
        Some(&TransitionOutcome::Unchanged)
    );
    assert_eq!(
        report.outcome_for(FeatureKey::WindowsManager),
        Some(&TransitionOutcome::Activated)
    );
    assert_eq!(factory.journal.built(FeatureKey::Shortcut), 0);
    assert!(manager.status().is_consistent());

    manager.cleanup().await;
}

#[tokio::test]
async fn test_activation_follows_fixed_order() {
    let factory = RecordingFactory::new();
    let manager = manager(ScriptedChecker::new(), factory.clone(), 100);

    manager.initialize().await.unwrap();

    let activations: Vec<String> = factory
        .journal
        .events()
        .into_iter()
        .filter(|event| event.starts_with("activate:"))
        .collect();
    let expected: Vec<String> = FeatureKey::ACTIVATION_ORDER
        .iter()
        .map(|key| format!("activate:{}", key))
        .collect();
    assert_eq!(activations, expected);

    manager.cleanup().await;
}

#[tokio::test(start_paused = true)]
async fn test_unwatched_setting_change_does_not_reevaluate() {
    let checker = ScriptedChecker::new();
    let manager = manager(checker.clone(), RecordingFactory::new(), 100);
    manager.initialize().await.unwrap();
    let active_before = manager.active_features();
    let checks_before = checker.calls();

    manager.signals().settings_changed("THEME", json!("dark"));
    tokio::time::sleep(Duration::from_millis(500)).await;

    assert_eq!(manager.status().passes_completed, 1);
    assert_eq!(checker.calls(), checks_before);
    assert_eq!(manager.active_features(), active_before);

    manager.cleanup().await;
}

#[tokio::test(start_paused = true)]
async fn test_watched_setting_change_reevaluates() {
    let checker = ScriptedChecker::new();
    let manager = manager(checker.clone(), RecordingFactory::new(), 100);
    manager.initialize().await.unwrap();

    checker.deny(FeatureKey::TextFieldIcon);
    manager
        .signals()
        .settings_changed("TRANSLATE_ON_TEXT_FIELDS", json!(false));
    tokio::time::sleep(Duration::from_millis(500)).await;

    assert_eq!(manager.status().passes_completed, 2);
    assert!(!manager.is_feature_active(FeatureKey::TextFieldIcon));
    assert!(manager.status().is_consistent());

    manager.cleanup().await;
}

#[tokio::test(start_paused = true)]
async fn test_watched_change_lost_in_a_burst_still_reevaluates() {
    let checker = ScriptedChecker::new();
    let manager = manager(checker.clone(), RecordingFactory::new(), 100);
    manager.initialize().await.unwrap();

    checker.deny(FeatureKey::Shortcut);
    let signals = manager.signals();
    signals.settings_changed("ENABLE_SHORTCUT_FOR_TEXT_FIELDS", json!(false));
    for index in 0..100 {
        signals.settings_changed(format!("THEME_VARIANT_{}", index), json!(index));
    }
    tokio::time::sleep(Duration::from_millis(500)).await;

    assert_eq!(manager.status().passes_completed, 2);
    assert!(!manager.is_feature_active(FeatureKey::Shortcut));

    manager.cleanup().await;
}

#[tokio::test(start_paused = true)]
async fn test_aborted_initialize_can_be_retried() {
    let checker = ScriptedChecker::new();
    let manager = manager(checker.clone(), RecordingFactory::new(), 100);
    checker.panic_once(FeatureKey::SelectElement);

    match manager.initialize().await {
        Err(OrchestratorError::PassAborted(message)) => assert!(message.contains("corrupted"), "{}", message),
        other => panic!("unexpected initialize result {:?}", other),
    }
    assert!(!manager.is_initialized());

    let report = manager.initialize().await.unwrap().unwrap();
    assert_eq!(report.pass, 1);
    assert_eq!(manager.active_features().len(), 6);

    checker.deny(FeatureKey::SelectElement);
    manager
        .signals()
        .settings_changed("TRANSLATE_WITH_SELECT_ELEMENT", json!(false));
    tokio::time::sleep(Duration::from_millis(500)).await;

    assert_eq!(manager.status().passes_completed, 2);
    assert!(!manager.is_feature_active(FeatureKey::SelectElement));

    manager.cleanup().await;
}

#[tokio::test(start_paused = true)]
async fn test_url_change_updates_oracle_before_reevaluating() {
    let checker = ScriptedChecker::new();
    let manager = manager(checker.clone(), RecordingFactory::new(), 100);
    manager.initialize().await.unwrap();

    checker.deny(FeatureKey::SelectElement);
    manager.signals().url_changed("https://docs.example.com/editor");
    tokio::time::sleep(Duration::from_millis(500)).await;

    assert_eq!(checker.urls(), vec!["https://docs.example.com/editor".to_string()]);
    assert_eq!(manager.status().passes_completed, 2);
    assert!(!manager.is_feature_active(FeatureKey::SelectElement));

    manager.cleanup().await;
}

#[tokio::test(start_paused = true)]
async fn test_requests_within_debounce_window_share_one_pass() {
    let manager = manager(ScriptedChecker::new(), RecordingFactory::new(), 100);

    let first = tokio::spawn({
        let manager = manager.clone();
        async move { manager.reevaluate_features("a").await }
    });
    tokio::time::sleep(Duration::from_millis(10)).await;
    let second = tokio::spawn({
        let manager = manager.clone();
        async move { manager.reevaluate_features("b").await }
    });

    let first = first.await.unwrap().unwrap();
    let second = second.await.unwrap().unwrap();

    assert_eq!(first, second);
    assert_eq!(first.pass, 1);
    assert_eq!(first.reasons, vec!["a".to_string(), "b".to_string()]);
    assert_eq!(manager.status().passes_completed, 1);
    assert_eq!(manager.status().pending_requests, 0);

    manager.cleanup().await;
}

#[tokio::test(start_paused = true)]
async fn test_requests_in_separate_windows_get_separate_passes() {
    let manager = manager(ScriptedChecker::new(), RecordingFactory::new(), 100);

    let first = manager.reevaluate_features("first").await.unwrap();
    tokio::time::sleep(Duration::from_millis(300)).await;
    let second = manager.reevaluate_features("second").await.unwrap();

    assert_eq!(first.pass, 1);
    assert_eq!(second.pass, 2);
    assert_eq!(second.reasons, vec!["second".to_string()]);
    assert_eq!(second.changed().count(), 0);

    manager.cleanup().await;
}

#[tokio::test]
async fn test_failed_activation_is_reported_not_raised() {
    let factory = RecordingFactory::new();
    factory.fail(FeatureKey::TextSelection);
    let manager = manager(ScriptedChecker::new(), factory.clone(), 0);

    let report = manager.initialize().await.unwrap().unwrap();
    assert!(!manager.is_feature_active(FeatureKey::TextSelection));
    assert!(manager.is_feature_active(FeatureKey::SelectElement));
    assert!(!report.is_clean());

    let report = manager.reevaluate_features("retry").await.unwrap();
    match report.outcome_for(FeatureKey::TextSelection) {
        Some(TransitionOutcome::Failed { error }) => assert!(error.contains("exploded")),
        other => panic!("unexpected outcome {:?}", other),
    }
    assert_eq!(report.failures().count(), 1);
    assert!(!manager.is_feature_active(FeatureKey::TextSelection));
    assert_eq!(factory.journal.count("release:text-selection"), 2);
    assert!(manager.status().is_consistent());

    manager.cleanup().await;
}

#[tokio::test]
async fn test_declined_activation_is_not_recorded() {
    let factory = RecordingFactory::new();
    factory.decline(FeatureKey::Shortcut);
    let manager = manager(ScriptedChecker::new(), factory, 0);

    let report = manager.initialize().await.unwrap().unwrap();

    assert_eq!(
        report.outcome_for(FeatureKey::Shortcut),
        Some(&TransitionOutcome::Declined)
    );
    assert!(!manager.is_feature_active(FeatureKey::Shortcut));
    assert!(manager.status().is_consistent());
    assert_eq!(manager.activate_feature(FeatureKey::Shortcut).await, Ok(false));

    manager.cleanup().await;
}

#[tokio::test]
async fn test_oracle_failure_counts_as_ineligible() {
    let checker = ScriptedChecker::new();
    checker.error_on(FeatureKey::WindowsManager);
    let manager = manager(checker.clone(), RecordingFactory::new(), 0);

    manager.initialize().await.unwrap();
    assert!(!manager.is_feature_active(FeatureKey::WindowsManager));
    assert!(!manager.should_activate_feature(FeatureKey::WindowsManager).await);
    assert!(manager.should_activate_feature(FeatureKey::Shortcut).await);

    manager.cleanup().await;
}

#[tokio::test]
async fn test_ineligible_feature_is_deactivated_on_next_pass() {
    let checker = ScriptedChecker::new();
    let factory = RecordingFactory::new();
    let manager = manager(checker.clone(), factory.clone(), 0);
    manager.initialize().await.unwrap();

    checker.deny(FeatureKey::WindowsManager);
    let report = manager.reevaluate_features("settings-change:EXTENSION_ENABLED").await.unwrap();

    assert_eq!(
        report.outcome_for(FeatureKey::WindowsManager),
        Some(&TransitionOutcome::Deactivated)
    );
    assert!(!manager.is_feature_active(FeatureKey::WindowsManager));
    assert_eq!(factory.journal.count("deactivate:windows-manager"), 1);
    assert_eq!(factory.journal.count("release:windows-manager"), 1);

    checker.allow(FeatureKey::WindowsManager);
    let report = manager.reevaluate_features("settings-change:EXTENSION_ENABLED").await.unwrap();
    assert_eq!(
        report.outcome_for(FeatureKey::WindowsManager),
        Some(&TransitionOutcome::Activated)
    );
    assert_eq!(factory.journal.built(FeatureKey::WindowsManager), 2);

    manager.cleanup().await;
}

#[tokio::test]
async fn test_manual_activation_is_idempotent() {
    let factory = RecordingFactory::new();
    let manager = manager(ScriptedChecker::new(), factory.clone(), 0);

    assert_eq!(manager.activate_feature(FeatureKey::TextSelection).await, Ok(true));
    assert_eq!(manager.activate_feature(FeatureKey::TextSelection).await, Ok(true));
    assert_eq!(factory.journal.built(FeatureKey::TextSelection), 1);
    assert_eq!(factory.journal.count("activate:text-selection"), 1);

    assert_eq!(manager.deactivate_feature(FeatureKey::TextSelection).await, Ok(true));
    assert_eq!(manager.deactivate_feature(FeatureKey::TextSelection).await, Ok(false));
    assert_eq!(factory.journal.count("deactivate:text-selection"), 1);
    assert!(manager.status().is_consistent());

    manager.cleanup().await;
}

#[tokio::test]
async fn test_dependencies_follow_provider_lifecycle() {
    let checker = ScriptedChecker::new();
    let factory = RecordingFactory::new();
    let manager = manager(checker.clone(), factory.clone(), 0);
    manager.initialize().await.unwrap();

    let events = factory.journal.events();
    assert!(events.contains(&"inject:text-selection:select_element_manager=select-element".to_string()));
    assert!(events.contains(&"inject:text-field-icon:text_selection_manager=text-selection".to_string()));

    checker.deny(FeatureKey::SelectElement);
    manager.reevaluate_features("select-element-off").await.unwrap();

    assert_eq!(
        factory
            .journal
            .count("inject:text-selection:select_element_manager=none"),
        1
    );
    assert!(manager.shared(FeatureKey::SelectElement).is_none());
    let shared = manager.shared(FeatureKey::TextSelection).unwrap();
    assert_eq!(
        shared.downcast_ref::<FeatureKey>(),
        Some(&FeatureKey::TextSelection)
    );

    manager.cleanup().await;
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_triggers_never_double_activate() {
    let factory = RecordingFactory::new();
    factory.delay_activation(Duration::from_millis(50));
    let manager = manager(ScriptedChecker::new(), factory.clone(), 10);

    let pass = tokio::spawn({
        let manager = manager.clone();
        async move { manager.reevaluate_features("url-change").await }
    });
    let direct = tokio::spawn({
        let manager = manager.clone();
        async move { manager.activate_feature(FeatureKey::Shortcut).await }
    });
    let status_during = {
        tokio::time::sleep(Duration::from_millis(30)).await;
        manager.status()
    };

    pass.await.unwrap().unwrap();
    assert_eq!(direct.await.unwrap(), Ok(true));

    assert!(status_during.is_consistent());
    for key in FeatureKey::ACTIVATION_ORDER {
        assert_eq!(factory.journal.built(key), 1, "{} built more than once", key);
    }
    assert!(manager.status().is_consistent());

    manager.cleanup().await;
}

#[tokio::test]
async fn test_cleanup_shuts_everything_down() {
    let factory = RecordingFactory::new();
    let manager = manager(ScriptedChecker::new(), factory.clone(), 0);
    manager.initialize().await.unwrap();

    manager.cleanup().await;
    manager.cleanup().await;

    let status = manager.status();
    assert!(status.shut_down);
    assert!(status.active.is_empty());
    assert!(status.handlers.is_empty());
    for key in FeatureKey::ACTIVATION_ORDER {
        assert_eq!(factory.journal.count(&format!("deactivate:{}", key)), 1);
    }

    assert_eq!(
        manager.reevaluate_features("late").await,
        Err(OrchestratorError::ShutDown)
    );
    assert_eq!(
        manager.activate_feature(FeatureKey::Shortcut).await,
        Err(FeatureError::ManagerShutDown)
    );
    assert_eq!(manager.initialize().await, Err(OrchestratorError::ShutDown));
}

#[tokio::test(start_paused = true)]
async fn test_cleanup_resolves_queued_requests() {
    let manager = manager(ScriptedChecker::new(), RecordingFactory::new(), 100);

    let waiting = tokio::spawn({
        let manager = manager.clone();
        async move { manager.reevaluate_features("queued").await }
    });
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(manager.status().pending_requests, 1);

    manager.cleanup().await;

    assert_eq!(waiting.await.unwrap(), Err(OrchestratorError::ShutDown));
    assert_eq!(manager.status().passes_completed, 0);
}

#[tokio::test]
async fn test_smart_cleanup_spares_critical_features() {
    let manager = manager(ScriptedChecker::new(), RecordingFactory::new(), 0);
    manager.initialize().await.unwrap();

    let released = manager.perform_smart_cleanup().await;

    assert!(released.is_empty());
    assert_eq!(manager.active_features(), FeatureKey::ACTIVATION_ORDER.to_vec());

    manager.cleanup().await;
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn prop_requests_inside_one_window_coalesce(gaps in prop::collection::vec(0u64..90, 1..8)) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .start_paused(true)
            .build()
            .unwrap();

        let (reports, passes) = runtime.block_on(async {
            let manager = manager(ScriptedChecker::new(), RecordingFactory::new(), 100);
            let mut waiters = Vec::new();
            for (index, gap) in gaps.iter().enumerate() {
                tokio::time::sleep(Duration::from_millis(*gap)).await;
                let manager = manager.clone();
                waiters.push(tokio::spawn(async move {
                    manager.reevaluate_features(format!("r{}", index)).await
                }));
            }
            let mut reports = Vec::new();
            for waiter in waiters {
                reports.push(waiter.await.unwrap().unwrap());
            }
            let passes = manager.status().passes_completed;
            manager.cleanup().await;
            (reports, passes)
        });

        prop_assert_eq!(passes, 1);
        let expected: Vec<String> = (0..gaps.len()).map(|index| format!("r{}", index)).collect();
        for report in &reports {
            prop_assert_eq!(report.pass, 1);
            prop_assert_eq!(&report.reasons, &expected);
        }
    }
}
