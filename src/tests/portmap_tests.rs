// Port Mapping Tests - PortMapper gate, outcomes and the UPnP gateway

use super::fakes::{FakeGateway, GatewayCall};
use crate::config::NetplayConfig;
use crate::portmap::{
    Gateway, GatewayError, IgdGateway, IpProtocol, MappedPorts, MappingDescriptions,
    MappingFailure, MappingOutcome, MappingSlot, PortMapper, SlotFailure, shared,
};
use crate::portmap::upnp::outbound_ipv4;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;

fn mapper_for(gateway: &FakeGateway) -> PortMapper {
    PortMapper::new(
        shared(gateway.clone()),
        MappingDescriptions::from(&NetplayConfig::default()),
        Duration::from_millis(2000),
    )
}

#[test]
fn test_perform_mapping_success() {
    let gateway = FakeGateway::new();
    let mapper = mapper_for(&gateway);

    let outcome = mapper.perform_mapping(6000, 5000).expect("mapping should run");

    assert!(outcome.is_success());
    assert_eq!(outcome.as_triple(), (6000, 5000, 5000));

    let calls = gateway.calls();
    assert_eq!(calls.len(), 4);
    assert_eq!(calls[0], GatewayCall::Init);
    assert_eq!(
        calls[1],
        GatewayCall::Add {
            protocol: IpProtocol::TCP,
            description: "Netplay Room".to_string(),
            external_port: 6000,
            internal_port: 6000,
        }
    );
    assert_eq!(
        calls[2],
        GatewayCall::Add {
            protocol: IpProtocol::TCP,
            description: "Netplay Core TCP".to_string(),
            external_port: 5000,
            internal_port: 5000,
        }
    );
    assert_eq!(
        calls[3],
        GatewayCall::Add {
            protocol: IpProtocol::UDP,
            description: "Netplay Core UDP".to_string(),
            external_port: 5000,
            internal_port: 5000,
        }
    );
}

#[test]
fn test_perform_mapping_partial_failure_keeps_mappings_until_teardown() {
    let gateway = FakeGateway::failing_add(2);
    let mapper = mapper_for(&gateway);

    let outcome = mapper.perform_mapping(6000, 5000).expect("mapping should run");

    assert_eq!(outcome.as_triple(), (-1, -1, -1));
    match &outcome {
        MappingOutcome::Failed(failure) => {
            assert_eq!(failure.failures.len(), 1);
            assert!(failure.failed(MappingSlot::CoreTcp));
            assert!(!failure.failed(MappingSlot::Room));
            assert_eq!(failure.failures[0].port, 5000);
        }
        MappingOutcome::Mapped(_) => panic!("expected failure"),
    }

    // All three adds were attempted; the successful ones stay registered
    assert_eq!(gateway.add_count(), 3);
    assert!(gateway.is_mapped(IpProtocol::TCP, 6000));
    assert!(gateway.is_mapped(IpProtocol::UDP, 5000));

    mapper.teardown(6000, 5000);
    assert_eq!(gateway.active_mappings(), 0);
}

#[test]
fn test_perform_mapping_init_failure_skips_adds() {
    let gateway = FakeGateway::failing_init();
    let mapper = mapper_for(&gateway);

    let outcome = mapper.perform_mapping(6000, 5000).expect("mapping should run");

    match outcome {
        MappingOutcome::Failed(failure) => {
            assert_eq!(failure.failures.len(), 3);
            assert!(failure.failures.iter().all(|f| f.reason == "No gateway found"));
        }
        MappingOutcome::Mapped(_) => panic!("expected failure"),
    }
    assert_eq!(gateway.calls(), vec![GatewayCall::Init]);
}

#[test]
fn test_teardown_without_mapping() {
    let gateway = FakeGateway::new();
    let mapper = mapper_for(&gateway);

    mapper.teardown(0, 5000);

    assert_eq!(
        gateway.calls(),
        vec![
            GatewayCall::remove(IpProtocol::TCP, 0),
            GatewayCall::remove(IpProtocol::TCP, 5000),
            GatewayCall::remove(IpProtocol::UDP, 5000),
            GatewayCall::Shutdown,
        ]
    );
    assert!(mapper.is_shutting_down());
}

#[test]
fn test_mapping_after_teardown_is_dropped() {
    let gateway = FakeGateway::new();
    let mapper = mapper_for(&gateway);

    mapper.teardown(0, 5000);
    let outcome = mapper.perform_mapping(6000, 5000);

    assert!(outcome.is_none());
    assert_eq!(gateway.add_count(), 0);
    assert_eq!(gateway.calls().len(), 4);
}

#[test]
fn test_fresh_mapper_on_shared_gateway_is_not_shutting_down() {
    let gateway = FakeGateway::new();
    let shared_gateway = shared(gateway.clone());
    let descriptions = MappingDescriptions::from(&NetplayConfig::default());

    let first = PortMapper::new(Arc::clone(&shared_gateway), descriptions.clone(), Duration::from_secs(1));
    first.teardown(0, 5000);

    let second = PortMapper::new(shared_gateway, descriptions, Duration::from_secs(1));
    assert!(!second.is_shutting_down());
    assert!(second.perform_mapping(6000, 5001).is_some());
    assert!(gateway.is_mapped(IpProtocol::UDP, 5001));
}

#[test]
fn test_teardown_and_mapping_never_interleave() {
    for _ in 0..20 {
        let gateway = FakeGateway::new().with_add_delay(Duration::from_millis(2));
        let mapper = Arc::new(mapper_for(&gateway));

        let mapping = {
            let mapper = Arc::clone(&mapper);
            std::thread::spawn(move || mapper.perform_mapping(6000, 5000))
        };
        let teardown = {
            let mapper = Arc::clone(&mapper);
            std::thread::spawn(move || mapper.teardown(6000, 5000))
        };

        let outcome = mapping.join().expect("mapping thread panicked");
        teardown.join().expect("teardown thread panicked");

        let calls = gateway.calls();
        let teardown_calls = vec![
            GatewayCall::remove(IpProtocol::TCP, 6000),
            GatewayCall::remove(IpProtocol::TCP, 5000),
            GatewayCall::remove(IpProtocol::UDP, 5000),
            GatewayCall::Shutdown,
        ];

        assert!(!gateway.overlapped());
        match outcome {
            // Mapping won the gate: its four calls come first, then teardown removes everything
            Some(_) => {
                assert_eq!(calls.len(), 8);
                assert_eq!(calls[0], GatewayCall::Init);
                assert_eq!(&calls[4..], teardown_calls.as_slice());
                assert_eq!(gateway.active_mappings(), 0);
            }
            // Teardown won: the mapping was dropped without touching the gateway
            None => assert_eq!(calls, teardown_calls),
        }
    }
}

#[test]
fn test_mapping_outcome_triple() {
    let mapped = MappingOutcome::Mapped(MappedPorts {
        room_port: 6000,
        tcp_port: 5000,
        udp_port: 5000,
        mapped_at: Utc::now(),
    });
    assert_eq!(mapped.as_triple(), (6000, 5000, 5000));

    let failed = MappingOutcome::Failed(MappingFailure::default());
    assert!(!failed.is_success());
    assert_eq!(failed.as_triple(), (-1, -1, -1));
}

#[test]
fn test_mapping_failure_display() {
    let failure = MappingFailure {
        failures: vec![SlotFailure {
            slot: MappingSlot::CoreUdp,
            port: 5000,
            reason: "AddPortMapping failed: refused".to_string(),
        }],
    };
    assert_eq!(
        failure.to_string(),
        "CoreUdp UDP/5000: AddPortMapping failed: refused"
    );
}

#[test]
fn test_mapping_slot_protocols() {
    assert_eq!(MappingSlot::Room.protocol(), IpProtocol::TCP);
    assert_eq!(MappingSlot::CoreTcp.protocol(), IpProtocol::TCP);
    assert_eq!(MappingSlot::CoreUdp.protocol(), IpProtocol::UDP);
}

// IgdGateway without a discovered gateway (no network access needed)

#[test]
fn test_igd_gateway_add_requires_init() {
    let mut gateway = IgdGateway::new();
    let result = gateway.add_mapping(IpProtocol::TCP, "Netplay Room", 6000, 6000);
    assert!(matches!(result, Err(GatewayError::NotInitialized)));
}

#[test]
fn test_igd_gateway_remove_is_noop_without_gateway() {
    let mut gateway = IgdGateway::new();
    assert!(gateway.remove_mapping(IpProtocol::TCP, 0).is_ok());
    assert!(gateway.remove_mapping(IpProtocol::UDP, 5000).is_ok());
    gateway.shutdown();
    gateway.shutdown();
}

#[test]
fn test_outbound_ipv4_is_a_concrete_address() {
    // Hosts without a default route legitimately fail here
    match outbound_ipv4() {
        Ok(ip) => assert!(!ip.is_unspecified()),
        Err(e) => assert!(matches!(e, GatewayError::Io(_) | GatewayError::Internal(_))),
    }
}
