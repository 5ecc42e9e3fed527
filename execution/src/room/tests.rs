use super::*;
use crate::mocks::{armored_species, fragile_species, player, room_config, Harness};
use crate::wallet::{MemoryWallet, REASON_BULLET_COST, REASON_FISH_REWARD};
use fishhunt_types::{ErrorKind, GameError, RoomStatus, WalletOperation};
use std::f64::consts::FRAC_PI_2;

fn aim_up(power: u32) -> FireRequest {
    FireRequest {
        angle: -FRAC_PI_2,
        power,
        origin: None,
    }
}

#[tokio::test]
async fn test_join_seats_player_and_activates_room() {
    let harness = Harness::new(MemoryWallet::new(1_000));
    let (mailbox, _events, _room) = harness.room(room_config(Tier::Novice));

    let joined = mailbox.join(player(1)).unwrap().await.unwrap();
    assert_eq!(joined.player.seat, 0);
    assert_eq!(joined.player.balance, 1_000);
    assert_eq!(joined.player_count, 1);
    assert_eq!(joined.snapshot.status, RoomStatus::Active);
    assert_eq!(joined.snapshot.fish.len(), 5);

    let second = mailbox.join(player(2)).unwrap().await.unwrap();
    assert_eq!(second.player.seat, 1);
    assert_eq!(second.player_count, 2);
}

#[tokio::test]
async fn test_join_rejections() {
    let harness = Harness::new(MemoryWallet::new(1_000));
    let (mailbox, _events, _room) = harness.room(room_config(Tier::Novice));
    mailbox.join(player(1)).unwrap().await.unwrap();

    let duplicate = mailbox.join(player(1)).unwrap().await.unwrap_err();
    assert_eq!(duplicate, GameError::AlreadyInRoom(1));

    harness.wallet.set_balance(2, 99);
    let poor = mailbox.join(player(2)).unwrap().await.unwrap_err();
    assert_eq!(
        poor,
        GameError::InsufficientBalance {
            required: 100,
            available: 99
        }
    );
    assert_eq!(poor.kind(), ErrorKind::Validation);

    for player_id in 3..=5 {
        mailbox.join(player(player_id)).unwrap().await.unwrap();
    }
    let full = mailbox.join(player(6)).unwrap().await.unwrap_err();
    assert_eq!(full, GameError::RoomFull(4));
    assert_eq!(full.kind(), ErrorKind::Capacity);

    let summary = mailbox.summary().unwrap().await.unwrap();
    assert_eq!(summary.player_count, 4);
}

#[tokio::test]
async fn test_join_requires_tier_min_bet() {
    let harness = Harness::new(MemoryWallet::new(500));
    let (mailbox, _events, _room) = harness.room(room_config(Tier::Advanced));
    let err = mailbox.join(player(1)).unwrap().await.unwrap_err();
    assert_eq!(
        err,
        GameError::InsufficientBalance {
            required: 1_000,
            available: 500
        }
    );
}

#[tokio::test]
async fn test_fire_debits_wallet_and_records_bet() {
    let harness = Harness::new(MemoryWallet::new(1_000));
    let (mailbox, mut events, _room) = harness.room(room_config(Tier::Intermediate));
    mailbox.join(player(1)).unwrap().await.unwrap();
    mailbox.join(player(2)).unwrap().await.unwrap();

    let fired = mailbox.fire_bullet(1, aim_up(10)).unwrap().await.unwrap();
    assert_eq!(fired.bullet.cost, 20);
    assert_eq!(fired.balance, 980);
    assert_eq!(harness.wallet.balance_of(1), Some(980));
    let inventory = harness.ledger.get_inventory(Tier::Intermediate).await;
    assert_eq!(inventory.total_in, 20);

    let transfer = harness.wallet.transfers().pop().unwrap();
    assert_eq!(transfer.reason, REASON_BULLET_COST);
    assert_eq!(transfer.reference, "game:room_intermediate_test:bullet:1");

    let event = events
        .wait_for(|message| matches!(message, ServerMessage::BulletFired { .. }))
        .await
        .unwrap();
    assert_eq!(event.audience, Audience::AllExcept(1));
}

#[tokio::test]
async fn test_failed_debit_changes_nothing() {
    let harness = Harness::new(MemoryWallet::new(1_000));
    let (mailbox, _events, _room) = harness.room(room_config(Tier::Novice));
    mailbox.join(player(1)).unwrap().await.unwrap();
    harness.wallet.fail_debits(true);

    let err = mailbox.fire_bullet(1, aim_up(10)).unwrap().await.unwrap_err();
    assert!(matches!(
        err,
        GameError::Wallet {
            operation: WalletOperation::Debit,
            ..
        }
    ));
    assert_eq!(err.kind(), ErrorKind::Resource);
    assert_eq!(mailbox.player(1).unwrap().await.unwrap().balance, 1_000);
    assert!(mailbox.snapshot().unwrap().await.unwrap().bullets.is_empty());
    assert_eq!(harness.ledger.get_inventory(Tier::Novice).await.total_in, 0);

    // The rejected shot still consumed its id so the next reference is fresh.
    harness.wallet.fail_debits(false);
    let fired = mailbox.fire_bullet(1, aim_up(10)).unwrap().await.unwrap();
    assert_eq!(fired.bullet.id, 2);
}

#[tokio::test(start_paused = true)]
async fn test_debit_timeout_changes_nothing() {
    let harness = Harness::new(MemoryWallet::new(1_000));
    let (mailbox, _events, _room) = harness.room(room_config(Tier::Novice));
    mailbox.join(player(1)).unwrap().await.unwrap();
    harness.wallet.set_delay(Duration::from_secs(5));

    let err = mailbox.fire_bullet(1, aim_up(10)).unwrap().await.unwrap_err();
    assert_eq!(
        err,
        GameError::WalletTimeout {
            operation: WalletOperation::Debit,
            timeout_ms: 2_000
        }
    );
    harness.wallet.set_delay(Duration::ZERO);
    assert_eq!(mailbox.player(1).unwrap().await.unwrap().balance, 1_000);
    assert!(mailbox.snapshot().unwrap().await.unwrap().bullets.is_empty());
    assert_eq!(harness.ledger.get_inventory(Tier::Novice).await.total_in, 0);
    assert_eq!(harness.wallet.balance_of(1), Some(1_000));
}

#[tokio::test]
async fn test_fire_requires_active_room() {
    let harness = Harness::new(MemoryWallet::new(1_000));
    let mut config = room_config(Tier::Novice);
    config.min_players_to_start = 2;
    let (mailbox, _events, _room) = harness.room(config);
    mailbox.join(player(1)).unwrap().await.unwrap();

    let err = mailbox.fire_bullet(1, aim_up(10)).unwrap().await.unwrap_err();
    assert_eq!(err, GameError::RoomNotActive(RoomStatus::Waiting));
    let err = mailbox.fire_bullet(9, aim_up(10)).unwrap().await.unwrap_err();
    assert_eq!(err, GameError::PlayerNotInRoom(9));
    assert!(harness.wallet.transfers().is_empty());
}

#[tokio::test]
async fn test_hit_validation_leaves_state_unchanged() {
    let harness = Harness::new(MemoryWallet::new(1_000)).with_species(armored_species());
    let (mailbox, _events, _room) = harness.room(room_config(Tier::Novice));
    let joined = mailbox.join(player(1)).unwrap().await.unwrap();
    mailbox.join(player(2)).unwrap().await.unwrap();
    let fish_id = joined.snapshot.fish[0].id;
    let fired = mailbox.fire_bullet(1, aim_up(10)).unwrap().await.unwrap();

    let err = mailbox.hit_fish(1, fired.bullet.id, 9_999).unwrap().await.unwrap_err();
    assert_eq!(err, GameError::FishNotFound(9_999));
    assert_eq!(err.kind(), ErrorKind::Validation);

    let err = mailbox.hit_fish(1, 9_999, fish_id).unwrap().await.unwrap_err();
    assert_eq!(err, GameError::BulletNotFound(9_999));

    let err = mailbox.hit_fish(2, fired.bullet.id, fish_id).unwrap().await.unwrap_err();
    assert_eq!(
        err,
        GameError::BulletNotOwned {
            bullet: fired.bullet.id,
            player: 2
        }
    );

    let snapshot = mailbox.snapshot().unwrap().await.unwrap();
    assert_eq!(snapshot.bullets.len(), 1);
    let fish = snapshot.fish.iter().find(|fish| fish.id == fish_id).unwrap();
    assert_eq!(fish.health, fish.max_health);
}

#[tokio::test]
async fn test_non_lethal_hit_damages_and_consumes_bullet() {
    let harness = Harness::new(MemoryWallet::new(1_000)).with_species(armored_species());
    let (mailbox, _events, _room) = harness.room(room_config(Tier::Novice));
    let joined = mailbox.join(player(1)).unwrap().await.unwrap();
    let fish_id = joined.snapshot.fish[0].id;
    let fired = mailbox.fire_bullet(1, aim_up(50)).unwrap().await.unwrap();

    let result = mailbox.hit_fish(1, fired.bullet.id, fish_id).unwrap().await.unwrap();
    assert!(!result.killed);
    assert!(!result.success);
    assert_eq!(result.reward, 0);
    assert!(result.damage >= 40);
    assert!(result.remaining_health < joined.snapshot.fish[0].max_health);

    let err = mailbox.hit_fish(1, fired.bullet.id, fish_id).unwrap().await.unwrap_err();
    assert_eq!(err, GameError::BulletNotFound(fired.bullet.id));
}

#[tokio::test]
async fn test_lethal_hit_pays_once() {
    let harness = Harness::new(MemoryWallet::new(1_000)).with_species(fragile_species());
    let (mailbox, _events, _room) = harness.room(room_config(Tier::Novice));
    let joined = mailbox.join(player(1)).unwrap().await.unwrap();
    let fish_id = joined.snapshot.fish[0].id;

    let fired = mailbox.fire_bullet(1, aim_up(10)).unwrap().await.unwrap();
    let result = mailbox.hit_fish(1, fired.bullet.id, fish_id).unwrap().await.unwrap();
    assert!(result.killed);
    assert!(result.success);
    assert!(result.reward >= 9, "reward {}", result.reward);
    assert_eq!(result.balance, 1_000 - 10 + result.reward);
    assert_eq!(harness.wallet.balance_of(1), Some(result.balance));

    let inventory = harness.ledger.get_inventory(Tier::Novice).await;
    assert_eq!(inventory.total_in, 10);
    assert_eq!(inventory.total_out, result.reward);
    let credit = harness.wallet.transfers().pop().unwrap();
    assert_eq!(credit.reason, REASON_FISH_REWARD);
    assert_eq!(credit.reference, format!("game:room_novice_test:fish:{fish_id}"));

    let again = mailbox.fire_bullet(1, aim_up(10)).unwrap().await.unwrap();
    let err = mailbox.hit_fish(1, again.bullet.id, fish_id).unwrap().await.unwrap_err();
    assert_eq!(err, GameError::FishNotFound(fish_id));
    assert_eq!(
        harness.ledger.get_inventory(Tier::Novice).await.total_out,
        result.reward
    );
}

#[tokio::test]
async fn test_denied_kill_removes_fish_without_payout() {
    let rtp = RtpConfig {
        cold_start_threshold: 0,
        ..RtpConfig::default()
    };
    let harness = Harness::with_configs(MemoryWallet::new(1_000), rtp, ModelConfig::default())
        .with_species(fragile_species());
    harness.ledger.add_bet(Tier::Novice, 1_000).await;
    harness.ledger.add_win(Tier::Novice, 1_000_000_000).await;
    let (mailbox, mut events, _room) = harness.room(room_config(Tier::Novice));
    let joined = mailbox.join(player(1)).unwrap().await.unwrap();
    let fish_id = joined.snapshot.fish[0].id;

    let fired = mailbox.fire_bullet(1, aim_up(10)).unwrap().await.unwrap();
    let result = mailbox.hit_fish(1, fired.bullet.id, fish_id).unwrap().await.unwrap();
    assert!(result.killed);
    assert!(!result.success);
    assert_eq!(result.reward, 0);
    assert_eq!(result.balance, 990);

    let snapshot = mailbox.snapshot().unwrap().await.unwrap();
    assert!(snapshot.fish.iter().all(|fish| fish.id != fish_id));
    assert_eq!(
        harness.ledger.get_inventory(Tier::Novice).await.total_out,
        1_000_000_000
    );
    assert!(harness
        .wallet
        .transfers()
        .iter()
        .all(|transfer| transfer.reason == REASON_BULLET_COST));

    let killed = events
        .wait_for(|message| matches!(message, ServerMessage::FishKilled { .. }))
        .await
        .unwrap();
    assert_eq!(killed.audience, Audience::All);
}

#[tokio::test]
async fn test_failed_credit_withholds_reward_but_fish_stays_dead() {
    let harness = Harness::new(MemoryWallet::new(1_000)).with_species(fragile_species());
    let (mailbox, _events, _room) = harness.room(room_config(Tier::Novice));
    let joined = mailbox.join(player(1)).unwrap().await.unwrap();
    let fish_id = joined.snapshot.fish[0].id;
    harness.wallet.fail_credits(true);

    let fired = mailbox.fire_bullet(1, aim_up(10)).unwrap().await.unwrap();
    let err = mailbox.hit_fish(1, fired.bullet.id, fish_id).unwrap().await.unwrap_err();
    assert!(matches!(
        err,
        GameError::Wallet {
            operation: WalletOperation::Credit,
            ..
        }
    ));
    assert_eq!(err.kind(), ErrorKind::Resource);

    let snapshot = mailbox.snapshot().unwrap().await.unwrap();
    assert!(snapshot.fish.iter().all(|fish| fish.id != fish_id));
    assert!(snapshot.bullets.is_empty());
    assert_eq!(mailbox.player(1).unwrap().await.unwrap().balance, 990);
    assert_eq!(harness.ledger.get_inventory(Tier::Novice).await.total_out, 0);
    assert_eq!(harness.wallet.balance_of(1), Some(990));
}

#[tokio::test]
async fn test_leave_returns_session_and_drops_bullets() {
    let harness = Harness::new(MemoryWallet::new(1_000));
    let (mailbox, _events, _room) = harness.room(room_config(Tier::Novice));
    mailbox.join(player(1)).unwrap().await.unwrap();
    mailbox.fire_bullet(1, aim_up(10)).unwrap().await.unwrap();
    mailbox.fire_bullet(1, aim_up(5)).unwrap().await.unwrap();

    let session = mailbox.leave(1).unwrap().await.unwrap();
    assert_eq!(session.bullets_fired, 2);
    assert_eq!(session.total_wagered, 15);
    assert_eq!(session.net_profit, -15);
    assert!(session.left_at.is_some());

    let snapshot = mailbox.snapshot().unwrap().await.unwrap();
    assert!(snapshot.bullets.is_empty());
    assert!(snapshot.players.is_empty());
    assert_eq!(snapshot.status, RoomStatus::Waiting);
    // Wagers stay booked after the bullets are gone.
    assert_eq!(harness.ledger.get_inventory(Tier::Novice).await.total_in, 15);

    let err = mailbox.leave(1).unwrap().await.unwrap_err();
    assert_eq!(err, GameError::PlayerNotInRoom(1));

    harness.session_log.flush().await;
    assert_eq!(harness.sessions.stored(1), vec![session]);
}

#[tokio::test]
async fn test_switch_cannon() {
    let harness = Harness::new(MemoryWallet::new(1_000));
    let (mailbox, mut events, _room) = harness.room(room_config(Tier::Novice));
    mailbox.join(player(1)).unwrap().await.unwrap();
    mailbox.join(player(2)).unwrap().await.unwrap();

    let cannon = mailbox.switch_cannon(1, Some(3), 5).unwrap().await.unwrap();
    assert_eq!(cannon.kind, 3);
    assert_eq!(cannon.power, 50);
    let err = mailbox.switch_cannon(1, None, 11).unwrap().await.unwrap_err();
    assert_eq!(err, GameError::InvalidCannonLevel(11));
    assert_eq!(mailbox.player(1).unwrap().await.unwrap().cannon, cannon);

    let event = events
        .wait_for(|message| matches!(message, ServerMessage::CannonSwitched { .. }))
        .await
        .unwrap();
    assert_eq!(event.audience, Audience::AllExcept(1));
}

#[tokio::test]
async fn test_close_reports_sessions_and_stops_room() {
    let harness = Harness::new(MemoryWallet::new(1_000));
    let (mailbox, mut events, room) = harness.room(room_config(Tier::Novice));
    mailbox.join(player(1)).unwrap().await.unwrap();
    mailbox.fire_bullet(1, aim_up(10)).unwrap().await.unwrap();

    let report = mailbox.close("shutdown").await.unwrap();
    assert_eq!(report.reason, "shutdown");
    assert_eq!(report.stats.bullets_fired, 1);
    assert_eq!(report.stats.total_wagered, 10);
    assert_eq!(report.sessions.len(), 1);
    assert_eq!(report.sessions[0].player_id, 1);
    harness.session_log.flush().await;
    assert_eq!(harness.sessions.stored(1), report.sessions);

    let closed = events
        .wait_for(|message| matches!(message, ServerMessage::RoomClosed { .. }))
        .await
        .unwrap();
    assert_eq!(closed.room_id, "room_novice_test");
    assert_eq!(room.await.unwrap(), report);
    assert!(mailbox.is_closed());
    assert_eq!(
        mailbox.join(player(2)).err(),
        Some(GameError::RoomUnavailable("room_novice_test".into()))
    );
}

#[tokio::test(start_paused = true)]
async fn test_close_drains_queued_requests() {
    let harness = Harness::new(MemoryWallet::new(1_000));
    let (mailbox, _events, _room) = harness.room(room_config(Tier::Novice));
    harness.wallet.set_delay(Duration::from_millis(500));

    // The room is busy with the join while the close and a snapshot queue up behind it.
    let join = mailbox.join(player(1)).unwrap();
    let close = mailbox.close("shutdown");
    tokio::pin!(close);
    tokio::select! {
        biased;
        _ = &mut close => panic!("closed before the join finished"),
        _ = std::future::ready(()) => {}
    }
    let snapshot = mailbox.snapshot().unwrap();

    assert!(join.await.is_ok());
    let report = close.await.unwrap();
    assert_eq!(report.sessions.len(), 1);
    assert_eq!(
        snapshot.await.unwrap_err(),
        GameError::RoomClosing("room_novice_test".into())
    );
}

#[tokio::test(start_paused = true)]
async fn test_idle_room_closes_itself() {
    let harness = Harness::new(MemoryWallet::new(1_000));
    let mut config = room_config(Tier::Novice);
    config.idle_timeout = Some(Duration::from_secs(300));
    let (mailbox, mut events, room) = harness.room(config);
    mailbox.join(player(1)).unwrap().await.unwrap();
    mailbox.leave(1).unwrap().await.unwrap();

    let closed = events
        .wait_for(|message| matches!(message, ServerMessage::RoomClosed { .. }))
        .await
        .unwrap();
    match closed.message {
        ServerMessage::RoomClosed { reason, .. } => assert_eq!(reason, "idle"),
        other => panic!("unexpected message {other:?}"),
    }
    assert_eq!(room.await.unwrap().reason, "idle");
}

#[tokio::test(start_paused = true)]
async fn test_game_loop_expires_bullets_and_refills_fish() {
    let harness = Harness::new(MemoryWallet::new(1_000)).with_species(armored_species());
    let (mailbox, _events, _room) = harness.room(room_config(Tier::Novice));
    let joined = mailbox.join(player(1)).unwrap().await.unwrap();
    let fired = mailbox.fire_bullet(1, aim_up(10)).unwrap().await.unwrap();

    tokio::time::sleep(Duration::from_secs(6)).await;
    let snapshot = mailbox.snapshot().unwrap().await.unwrap();
    assert!(snapshot.bullets.is_empty());
    let min_fish = joined.snapshot.fish.len().max(10);
    assert!(snapshot.fish.len() >= min_fish, "fish {}", snapshot.fish.len());

    let err = mailbox
        .hit_fish(1, fired.bullet.id, snapshot.fish[0].id)
        .unwrap()
        .await
        .unwrap_err();
    assert_eq!(err, GameError::BulletNotFound(fired.bullet.id));
}

#[tokio::test]
async fn test_server_side_collision_resolves_kill() {
    let harness = Harness::new(MemoryWallet::new(1_000)).with_species(fragile_species());
    let mut config = room_config(Tier::Novice);
    config.server_collisions = true;
    let (mailbox, mut events, _room) = harness.room(config);
    let joined = mailbox.join(player(1)).unwrap().await.unwrap();
    let target = joined.snapshot.fish[0].clone();

    // Fly along the fish's own path: the bullet stays within the strike radius.
    let request = FireRequest {
        angle: target.heading,
        power: 10,
        origin: Some(target.position),
    };
    mailbox.fire_bullet(1, request).unwrap().await.unwrap();
    let killed = tokio::time::timeout(
        Duration::from_secs(5),
        events.wait_for(|message| matches!(message, ServerMessage::FishKilled { .. })),
    )
    .await
    .unwrap()
    .unwrap();
    match killed.message {
        ServerMessage::FishKilled { result, .. } => {
            assert_eq!(result.player_id, 1);
            assert!(result.killed);
        }
        other => panic!("unexpected message {other:?}"),
    }
}

#[tokio::test]
async fn test_failed_session_write_does_not_block_leave() {
    let harness = Harness::new(MemoryWallet::new(1_000));
    harness.sessions.fail_saves(true);
    let (mailbox, _events, _room) = harness.room(room_config(Tier::Novice));
    mailbox.join(player(1)).unwrap().await.unwrap();

    let session = mailbox.leave(1).unwrap().await.unwrap();
    assert_eq!(session.player_id, 1);
    harness.session_log.flush().await;
    assert!(harness.sessions.is_empty());

    // The room keeps serving after the lost write.
    harness.sessions.fail_saves(false);
    mailbox.join(player(1)).unwrap().await.unwrap();
    mailbox.leave(1).unwrap().await.unwrap();
    harness.session_log.flush().await;
    assert_eq!(harness.sessions.stored(1).len(), 1);
}
