//! Integration tests for networked multiplayer components
//!
//! These tests validate cross-crate interactions and real network behavior.

use node::{Game, GameEvent, NetworkSettings, OngoingGame, Session};
use rand::rngs::StdRng;
use rand::SeedableRng;
use shared::{decode, encode, CodecError, Direction, GameConfig, GameMessage, NodeRole, Payload};
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4, UdpSocket};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_test::assert_ok;

fn loopback_settings() -> NetworkSettings {
    NetworkSettings {
        bind_addr: SocketAddr::from((Ipv4Addr::LOCALHOST, 0)),
        // Port 0 keeps tests off the real discovery port.
        multicast_group: SocketAddrV4::new(Ipv4Addr::new(239, 192, 0, 4), 0),
        ..NetworkSettings::default()
    }
}

fn fast_config() -> GameConfig {
    GameConfig {
        width: 40,
        height: 30,
        food_static: 2,
        state_delay_ms: 100,
    }
}

/// NETWORK PROTOCOL TESTS
mod protocol_tests {
    use super::*;

    /// A snapshot produced by one game restores into another over the wire
    #[test]
    fn snapshot_survives_the_wire() {
        let mut master = Game::with_rng("arena", fast_config(), StdRng::seed_from_u64(1));
        master.new_player("alice").unwrap();
        master.new_player("bob").unwrap();
        master.update();

        let message = GameMessage::new(
            3,
            Payload::State {
                snapshot: master.snapshot(),
                roster: Vec::new(),
            },
        )
        .from_sender(Some(1));
        let bytes = encode(&message).unwrap();
        let decoded = decode(&bytes).unwrap();

        let mut replica = Game::new("arena", fast_config());
        match decoded.payload {
            Payload::State { snapshot, .. } => replica.restore(&snapshot).unwrap(),
            _ => panic!("Wrong payload after decoding"),
        }
        assert_eq!(replica.snapshot(), master.snapshot());
    }

    /// Tests real UDP socket communication with the game codec
    #[test]
    fn udp_socket_communication() {
        let a = UdpSocket::bind("127.0.0.1:0").expect("Failed to bind socket");
        let b = UdpSocket::bind("127.0.0.1:0").expect("Failed to bind socket");
        b.set_read_timeout(Some(Duration::from_millis(500))).unwrap();

        let message = GameMessage::new(
            11,
            Payload::Steer {
                direction: Direction::Down,
            },
        )
        .from_sender(Some(4))
        .to_receiver(Some(1));
        a.send_to(&encode(&message).unwrap(), b.local_addr().unwrap()).unwrap();

        let mut buf = [0u8; 1024];
        let (size, from) = b.recv_from(&mut buf).unwrap();
        assert_eq!(from, a.local_addr().unwrap());
        assert_eq!(decode(&buf[..size]).unwrap(), message);
    }

    /// An unknown enum tag is reported as such, not as ordinary garbage
    #[test]
    fn unknown_direction_is_reported() {
        let mut bytes = encode(&GameMessage::new(
            1,
            Payload::Steer {
                direction: Direction::Up,
            },
        ))
        .unwrap();
        let last = bytes.len() - 1;
        bytes[last] = 42;

        match decode(&bytes) {
            Err(CodecError::UnknownVariant(_)) => {}
            other => panic!("Wrong decode result: {:?}", other),
        }
    }
}

/// SESSION TESTS OVER LOOPBACK
mod session_tests {
    use super::*;

    async fn wait_for<F>(events: &mut mpsc::UnboundedReceiver<GameEvent>, mut pred: F) -> GameEvent
    where
        F: FnMut(&GameEvent) -> bool,
    {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
        loop {
            match tokio::time::timeout_at(deadline, events.recv()).await {
                Ok(Some(event)) if pred(&event) => return event,
                Ok(Some(_)) => {}
                _ => panic!("Expected event never arrived"),
            }
        }
    }

    fn ongoing(address: SocketAddr, master_id: u32, master_name: &str) -> OngoingGame {
        OngoingGame {
            address,
            announcement: shared::GameAnnouncement {
                game_name: "arena".to_string(),
                can_join: true,
                config: fast_config(),
                players: vec![shared::GamePlayer::new(master_id, master_name, None, NodeRole::Master)],
            },
        }
    }

    #[tokio::test]
    async fn host_join_and_play() {
        let (host, mut host_events) = assert_ok!(Session::start(loopback_settings()).await);
        assert_ok!(host.start_new_game("arena", "alice", fast_config()));
        wait_for(&mut host_events, |e| *e == GameEvent::RoleChanged(NodeRole::Master)).await;

        let (guest, mut guest_events) = assert_ok!(Session::start(loopback_settings()).await);
        assert_ok!(guest.join_game(ongoing(host.local_addr(), 1, "alice"), "bob", NodeRole::Normal));
        wait_for(&mut guest_events, |e| *e == GameEvent::Joined { player_id: 2 }).await;

        assert_ok!(guest.change_direction(Direction::Left));
        let event = wait_for(&mut guest_events, |e| matches!(e, GameEvent::StateUpdated { .. })).await;
        match event {
            GameEvent::StateUpdated { snapshot, players } => {
                assert!(snapshot.state_order >= 1);
                assert!(players.iter().any(|p| p.name == "alice" && p.role == NodeRole::Master));
                assert!(players.iter().any(|p| p.name == "bob"));
            }
            _ => panic!("Wrong event"),
        }

        assert_ok!(guest.shutdown().await);
        assert_ok!(host.shutdown().await);
    }

    #[tokio::test]
    async fn join_with_taken_name_fails() {
        let (host, mut host_events) = assert_ok!(Session::start(loopback_settings()).await);
        assert_ok!(host.start_new_game("arena", "alice", fast_config()));
        wait_for(&mut host_events, |e| matches!(e, GameEvent::Joined { .. })).await;

        let (guest, mut guest_events) = assert_ok!(Session::start(loopback_settings()).await);
        assert_ok!(guest.join_game(ongoing(host.local_addr(), 1, "alice"), "alice", NodeRole::Normal));
        match wait_for(&mut guest_events, |e| matches!(e, GameEvent::Error(_))).await {
            GameEvent::Error(text) => assert!(text.contains("already taken")),
            _ => panic!("Wrong event"),
        }

        assert_ok!(guest.shutdown().await);
        assert_ok!(host.shutdown().await);
    }

    #[tokio::test]
    async fn deputy_takes_over_when_master_leaves() {
        let (host, mut host_events) = assert_ok!(Session::start(loopback_settings()).await);
        assert_ok!(host.start_new_game("arena", "alice", fast_config()));
        wait_for(&mut host_events, |e| matches!(e, GameEvent::Joined { .. })).await;

        let (bob, mut bob_events) = assert_ok!(Session::start(loopback_settings()).await);
        assert_ok!(bob.join_game(ongoing(host.local_addr(), 1, "alice"), "bob", NodeRole::Normal));
        wait_for(&mut bob_events, |e| *e == GameEvent::RoleChanged(NodeRole::Deputy)).await;

        assert_ok!(host.shutdown().await);
        wait_for(&mut bob_events, |e| *e == GameEvent::RoleChanged(NodeRole::Master)).await;

        let (carol, mut carol_events) = assert_ok!(Session::start(loopback_settings()).await);
        assert_ok!(carol.join_game(ongoing(bob.local_addr(), 2, "bob"), "carol", NodeRole::Normal));
        match wait_for(&mut carol_events, |e| matches!(e, GameEvent::Joined { .. } | GameEvent::Error(_))).await {
            GameEvent::Joined { player_id } => assert_eq!(player_id, 3),
            other => panic!("Join against the new master failed: {:?}", other),
        }

        assert_ok!(carol.shutdown().await);
        assert_ok!(bob.shutdown().await);
    }
}
