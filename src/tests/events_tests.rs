// Event Tests - ChannelListener forwarding

use crate::events::{ChannelListener, NetplayEvent, NetplayListener};
use crate::portmap::{MappingFailure, MappingOutcome};

#[test]
fn test_channel_listener_preserves_order() {
    let (listener, events) = ChannelListener::new();

    listener.on_port_obtained(5000);
    listener.on_desync(7);
    listener.on_desync(9);
    listener.on_upnp_ports_obtained(MappingOutcome::Failed(MappingFailure::default()));
    listener.on_finish();

    let received: Vec<NetplayEvent> = events.try_iter().collect();
    assert_eq!(
        received,
        vec![
            NetplayEvent::PortObtained(5000),
            NetplayEvent::Desync(7),
            NetplayEvent::Desync(9),
            NetplayEvent::UpnpPortsObtained(MappingOutcome::Failed(MappingFailure::default())),
            NetplayEvent::Finish,
        ]
    );
}

#[test]
fn test_channel_listener_survives_dropped_receiver() {
    let (listener, events) = ChannelListener::new();
    drop(events);

    listener.on_port_obtained(5000);
    listener.on_finish();
}

#[test]
fn test_cloned_listener_shares_channel() {
    let (listener, events) = ChannelListener::new();
    let clone = listener.clone();

    listener.on_desync(1);
    clone.on_desync(2);

    let received: Vec<NetplayEvent> = events.try_iter().collect();
    assert_eq!(received, vec![NetplayEvent::Desync(1), NetplayEvent::Desync(2)]);
}
