mod common;

use powerview_remote::device::codec::Command;
use powerview_remote::device::registry::ShadeRegistry;
use powerview_remote::device::types::{ConnectionState, SessionEvent};
use powerview_remote::error::{RegistryError, SessionError};

use common::{bedroom, cipher, kitchen, new_session, next_matching, ready_session, MockTransport};

#[tokio::test]
async fn duplicate_shades_are_rejected() {
    let transport = MockTransport::with_shade(kitchen());
    let mut registry = ShadeRegistry::new();

    let (first, _r1) = ready_session(&transport).await;
    registry.add(kitchen(), first).map_err(|(err, _)| err).unwrap();

    let (second, _r2) = new_session(&transport);
    let (err, returned) = match registry.add(kitchen(), second) {
        Err(rejected) => rejected,
        Ok(()) => panic!("duplicate accepted"),
    };
    assert_eq!(err, RegistryError::AlreadyRegistered(kitchen()));
    assert_eq!(returned.state(), ConnectionState::Idle);
    assert_eq!(registry.len(), 1);
}

#[tokio::test]
async fn broadcast_reaches_every_ready_shade_and_reports_each() {
    let kitchen_transport = MockTransport::with_shade(kitchen());
    let bedroom_transport = MockTransport::with_shade(bedroom());
    let mut registry = ShadeRegistry::new();

    let (session, _r1) = ready_session(&kitchen_transport).await;
    registry.add(kitchen(), session).map_err(|(err, _)| err).unwrap();
    let (session, _r2) = ready_session(&bedroom_transport).await;
    registry.add(bedroom(), session).map_err(|(err, _)| err).unwrap();

    // the kitchen shade rejects the write, the bedroom one still gets it
    kitchen_transport.set_fail_write(true);
    let outcomes = registry.broadcast(&Command::SetPosition(0)).await;

    assert_eq!(outcomes.len(), 2);
    assert_eq!(outcomes[0].identity, kitchen());
    assert!(matches!(outcomes[0].result, Err(SessionError::Write(_))));
    assert_eq!(outcomes[1].identity, bedroom());
    assert!(outcomes[1].result.is_ok());

    let written = cipher().decrypt(&bedroom_transport.writes()[0]);
    assert_eq!(&written[..6], &[0xF7, 0x01, 0x00, 0x09, 0x00, 0x00]);
}

#[tokio::test]
async fn broadcast_skips_shades_that_are_not_ready() {
    let kitchen_transport = MockTransport::with_shade(kitchen());
    let bedroom_transport = MockTransport::with_shade(bedroom());
    let mut registry = ShadeRegistry::new();

    let (session, _r1) = ready_session(&kitchen_transport).await;
    registry.add(kitchen(), session).map_err(|(err, _)| err).unwrap();
    let (mut session, _r2) = ready_session(&bedroom_transport).await;
    session.disconnect().await;
    registry.add(bedroom(), session).map_err(|(err, _)| err).unwrap();

    let outcomes = registry.broadcast(&Command::Stop).await;
    assert_eq!(outcomes.len(), 1);
    assert_eq!(outcomes[0].identity, kitchen());
    assert!(bedroom_transport.writes().is_empty());
}

#[tokio::test]
async fn remove_disconnects_and_tolerates_unknown_shades() {
    let transport = MockTransport::with_shade(kitchen());
    let mut registry = ShadeRegistry::new();

    registry.remove(&bedroom()).await;

    let (session, _r) = ready_session(&transport).await;
    registry.add(kitchen(), session).map_err(|(err, _)| err).unwrap();
    registry.remove(&kitchen()).await;

    assert!(registry.is_empty());
    assert_eq!(transport.close_calls(), 1);

    registry.remove(&kitchen()).await;
    assert_eq!(transport.close_calls(), 1);
}

#[tokio::test]
async fn link_lost_events_are_routed_to_the_session() {
    let transport = MockTransport::with_shade(kitchen());
    let mut registry = ShadeRegistry::new();

    let (session, mut receiver) = ready_session(&transport).await;
    registry.add(kitchen(), session).map_err(|(err, _)| err).unwrap();

    transport.drop_link();
    let event = next_matching(&mut receiver, |e| matches!(e, SessionEvent::LinkLost(..))).await;
    registry.handle_event(&event).await;

    let session = registry.get_mut(&kitchen()).unwrap();
    assert_eq!(session.state(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn link_lost_for_a_replaced_link_is_ignored() {
    let transport = MockTransport::with_shade(kitchen());
    let mut registry = ShadeRegistry::new();

    let (session, mut receiver) = ready_session(&transport).await;
    registry.add(kitchen(), session).map_err(|(err, _)| err).unwrap();

    transport.drop_link();
    let stale = next_matching(&mut receiver, |e| matches!(e, SessionEvent::LinkLost(..))).await;

    // the send notices the dead link and reconnects before the event is handled
    let session = registry.get_mut(&kitchen()).unwrap();
    session.send(&Command::Stop).await.unwrap();
    assert_eq!(session.state(), ConnectionState::Ready);
    assert_eq!(transport.connect_calls(), 2);
    assert_eq!(transport.close_calls(), 1);

    registry.handle_event(&stale).await;

    let session = registry.get_mut(&kitchen()).unwrap();
    assert_eq!(session.state(), ConnectionState::Ready);
    assert_eq!(transport.close_calls(), 1);
    session.send(&Command::Stop).await.unwrap();
    assert_eq!(transport.writes().len(), 2);

    // the current link going away is still handled
    transport.drop_link();
    let current = next_matching(&mut receiver, |e| matches!(e, SessionEvent::LinkLost(..))).await;
    assert_ne!(current, stale);
    registry.handle_event(&current).await;
    assert_eq!(registry.get_mut(&kitchen()).unwrap().state(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn teardown_disconnects_everything() {
    let kitchen_transport = MockTransport::with_shade(kitchen());
    let bedroom_transport = MockTransport::with_shade(bedroom());
    let mut registry = ShadeRegistry::new();

    let (session, _r1) = ready_session(&kitchen_transport).await;
    registry.add(kitchen(), session).map_err(|(err, _)| err).unwrap();
    let (session, _r2) = new_session(&bedroom_transport);
    registry.add(bedroom(), session).map_err(|(err, _)| err).unwrap();

    assert_eq!(registry.identities().cloned().collect::<Vec<_>>(), vec![kitchen(), bedroom()]);

    registry.teardown_all().await;
    assert!(registry.is_empty());
    assert_eq!(kitchen_transport.close_calls(), 1);
    assert_eq!(bedroom_transport.close_calls(), 0);
}
