//! Ambient engine graph lifecycle and its coupling to playback

mod helpers;

use helpers::{test_player, two_chapter_track, SAMPLE_RATE};
use sravana_ap::audio::{AudioContext, OfflineContext, SharedAudioContext};
use sravana_ap::config::PlayerConfig;
use sravana_ap::synth::{AmbientEngine, AmbientKind, AmbientProfile};
use sravana_common::UserIdentity;
use std::sync::Arc;
use std::time::Duration;

fn engine() -> (AmbientEngine, Arc<OfflineContext>) {
    let context = Arc::new(OfflineContext::new(SAMPLE_RATE));
    let shared = SharedAudioContext::with_context(Arc::clone(&context) as Arc<dyn AudioContext>);
    (AmbientEngine::new(shared, 0.3), context)
}

#[test]
fn test_switching_profiles_leaves_one_graph() {
    let (mut engine, context) = engine();
    let rain = AmbientProfile::find("rain").unwrap();
    let bowl = AmbientProfile::find("singing-bowl").unwrap();

    engine.activate(&rain, 0.3);
    let first = engine.active_node().unwrap();
    engine.activate(&bowl, 0.3);
    let second = engine.active_node().unwrap();

    assert_ne!(first, second);
    assert_eq!(context.connected_nodes(), vec![second]);
    assert_eq!(engine.active_profile().map(|p| p.id.as_str()), Some("singing-bowl"));
}

#[test]
fn test_every_catalog_profile_renders() {
    let (mut engine, context) = engine();
    for profile in AmbientProfile::catalog() {
        engine.activate(&profile, 0.5);
        let rendered = context.render(SAMPLE_RATE as usize / 10);
        assert!(rendered.iter().all(|s| s.is_finite() && s.abs() <= 1.0));
        assert!(
            rendered.iter().any(|s| s.abs() > 1e-4),
            "profile {} is silent",
            profile.id
        );
    }
    assert_eq!(context.connected_nodes().len(), 1);
}

#[test]
fn test_custom_frequency_profile() {
    let (mut engine, context) = engine();
    let profile = AmbientProfile::new("tone-111", "111 Hz", AmbientKind::Frequency { hz: 111.0 });
    engine.activate(&profile, 1.0);
    let peak = context
        .render(SAMPLE_RATE as usize)
        .into_iter()
        .fold(0.0f32, |m, s| m.max(s.abs()));
    assert!(peak > 0.9 && peak <= 1.0);
}

async fn settle() {
    tokio::time::sleep(Duration::from_millis(10)).await;
}

#[tokio::test(start_paused = true)]
async fn test_ambient_follows_playing_state() {
    let mut config = PlayerConfig::default();
    config.sleep_timer.chime_on_sleep = false;
    let t = test_player(config);
    t.player
        .open(two_chapter_track(), UserIdentity::Anonymous, None)
        .await
        .unwrap();

    t.player.select_ambient(Some(AmbientProfile::find("ocean").unwrap()));
    settle().await;
    assert!(t.context.connected_nodes().is_empty());
    assert!(!t.player.ambient_status().active);

    t.player.play().await.unwrap();
    settle().await;
    assert_eq!(t.context.connected_nodes().len(), 1);
    assert!(t.player.ambient_status().active);

    // Volume changes keep the graph
    let node = t.context.connected_nodes();
    assert_eq!(t.player.set_ambient_volume(0.6), 0.6);
    settle().await;
    assert_eq!(t.context.connected_nodes(), node);

    t.player.pause().await.unwrap();
    settle().await;
    assert!(t.context.connected_nodes().is_empty());

    t.player.play().await.unwrap();
    t.player.select_ambient(Some(AmbientProfile::find("tone-432").unwrap()));
    settle().await;
    assert_eq!(t.context.connected_nodes().len(), 1);

    t.player.close().await;
    assert!(t.context.connected_nodes().is_empty());
    assert!(t.player.ambient_status().selected.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_reselecting_same_id_with_new_settings_rebuilds_graph() {
    let mut config = PlayerConfig::default();
    config.sleep_timer.chime_on_sleep = false;
    let t = test_player(config);
    t.player
        .open(two_chapter_track(), UserIdentity::Anonymous, None)
        .await
        .unwrap();
    t.player.play().await.unwrap();

    t.player.select_ambient(Some(AmbientProfile::new(
        "custom",
        "Custom",
        AmbientKind::Frequency { hz: 111.0 },
    )));
    settle().await;
    let before = t.context.connected_nodes();
    assert_eq!(before.len(), 1);

    t.player.select_ambient(Some(AmbientProfile::new(
        "custom",
        "Custom",
        AmbientKind::Frequency { hz: 900.0 },
    )));
    settle().await;
    let after = t.context.connected_nodes();
    assert_eq!(after.len(), 1);
    assert_ne!(before, after);
    assert_eq!(
        t.player.ambient_status().selected.map(|p| p.kind),
        Some(AmbientKind::Frequency { hz: 900.0 })
    );

    // Re-sending an identical profile keeps the running graph
    t.player.select_ambient(Some(AmbientProfile::new(
        "custom",
        "Custom",
        AmbientKind::Frequency { hz: 900.0 },
    )));
    settle().await;
    assert_eq!(t.context.connected_nodes(), after);
}

#[tokio::test]
async fn test_chime_plays_and_finishes() {
    let t = test_player(PlayerConfig::default());
    assert!(t.player.chime());
    assert_eq!(t.context.connected_nodes().len(), 1);

    // 3 s of decay, then the source drops itself
    t.context.render(SAMPLE_RATE as usize * 3 + 16);
    assert!(t.context.connected_nodes().is_empty());
}
