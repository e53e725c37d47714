//! # Transport Layer Tests: CongestionEnforcer
//!
//! Uses a recording fake socket to pin down call ordering and error mapping,
//! and a real loopback connection to exercise the kernel path.

use brutal_core::{ConfigSnapshot, EffectivePolicy, EnforceError, ServerConfig};
use brutal_transport::params::{BRUTAL_CONGESTION_CONTROL, CWND_GAIN_TENTHS, TCP_BRUTAL_PARAMS};
use brutal_transport::{before_serving, enforce, CongestionParams, CongestionSocket, Enforcement, KernelSocket};
use nix::errno::Errno;
use std::cell::RefCell;
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::os::unix::io::AsFd;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Call {
    Select(String),
    Params([u8; 12]),
}

#[derive(Default)]
struct FakeSocket {
    calls: RefCell<Vec<Call>>,
    select_error: Option<Errno>,
    params_error: Option<Errno>,
}

impl CongestionSocket for FakeSocket {
    fn select_congestion_control(&self, name: &str) -> Result<(), Errno> {
        self.calls.borrow_mut().push(Call::Select(name.to_string()));
        self.select_error.map_or(Ok(()), Err)
    }

    fn set_brutal_params(&self, params: &CongestionParams) -> Result<(), Errno> {
        self.calls.borrow_mut().push(Call::Params(params.to_bytes()));
        self.params_error.map_or(Ok(()), Err)
    }
}

fn enabled(rate: u64) -> EffectivePolicy {
    EffectivePolicy { enabled: true, rate }
}

fn peer() -> SocketAddr {
    "127.0.0.1:40000".parse().unwrap()
}

#[test]
fn test_kernel_contract_constants() {
    assert_eq!(BRUTAL_CONGESTION_CONTROL, "brutal");
    assert_eq!(TCP_BRUTAL_PARAMS, 23301);
    assert_eq!(CWND_GAIN_TENTHS, 15);
    assert_eq!(std::mem::size_of::<CongestionParams>(), 12);
}

#[test]
fn test_params_byte_layout() {
    let bytes = CongestionParams::new(500_000).to_bytes();
    assert_eq!(u64::from_ne_bytes(bytes[..8].try_into().unwrap()), 500_000);
    assert_eq!(u32::from_ne_bytes(bytes[8..].try_into().unwrap()), 15);
}

#[test]
fn test_disabled_policy_touches_nothing() {
    let socket = FakeSocket::default();
    let outcome = enforce(&socket, EffectivePolicy { enabled: false, rate: 500_000 });
    assert_eq!(outcome, Ok(Enforcement::NotApplicable));
    assert!(socket.calls.borrow().is_empty());
}

/// Selection first, then a 12-byte payload carrying the rate and gain.
#[test]
fn test_applied_issues_both_calls_in_order() {
    let socket = FakeSocket::default();
    let outcome = enforce(&socket, enabled(500_000));
    assert_eq!(outcome, Ok(Enforcement::Applied { rate: 500_000 }));

    let calls = socket.calls.borrow();
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[0], Call::Select("brutal".to_string()));
    assert_eq!(calls[1], Call::Params(CongestionParams::new(500_000).to_bytes()));
}

#[test]
fn test_selection_failure_skips_params() {
    let socket = FakeSocket {
        select_error: Some(Errno::ENOPROTOOPT),
        ..Default::default()
    };
    let outcome = enforce(&socket, enabled(500_000));
    assert_eq!(outcome, Err(EnforceError::CongestionSelection { errno: Errno::ENOPROTOOPT }));
    assert_eq!(*socket.calls.borrow(), vec![Call::Select("brutal".to_string())]);
}

#[test]
fn test_params_failure_is_distinct() {
    let socket = FakeSocket {
        params_error: Some(Errno::EINVAL),
        ..Default::default()
    };
    let err = enforce(&socket, enabled(1_000)).unwrap_err();
    assert_eq!(err, EnforceError::CongestionParams { errno: Errno::EINVAL });
    assert_eq!(err.errno(), Errno::EINVAL);
    assert_eq!(err.category(), "congestion-params");
    assert_eq!(socket.calls.borrow().len(), 2);
}

/// Repeating the call reissues both steps and reproduces the outcome.
#[test]
fn test_idempotent_reinvocation() {
    let ok = FakeSocket::default();
    assert_eq!(enforce(&ok, enabled(7)), enforce(&ok, enabled(7)));
    assert_eq!(ok.calls.borrow().len(), 4);

    let failing = FakeSocket {
        select_error: Some(Errno::ENOENT),
        ..Default::default()
    };
    assert_eq!(enforce(&failing, enabled(7)), enforce(&failing, enabled(7)));
    assert_eq!(failing.calls.borrow().len(), 2);
}

#[test]
fn test_hook_resolves_before_enforcing() {
    let config = ServerConfig::from_toml_str(
        r#"
tcp_brutal = true

[[server]]
server_name = ["off.test"]
tcp_brutal = false

[[server]]
server_name = ["on.test"]
tcp_brutal_rate = 123456
"#,
    )
    .unwrap();
    let snapshot = ConfigSnapshot::build(&config).unwrap();

    let socket = FakeSocket::default();
    let outcome = before_serving(&snapshot, Some("off.test"), "/", &socket, peer());
    assert_eq!(outcome, Ok(Enforcement::NotApplicable));
    assert!(socket.calls.borrow().is_empty());

    let outcome = before_serving(&snapshot, Some("on.test"), "/", &socket, peer());
    assert_eq!(outcome, Ok(Enforcement::Applied { rate: 123456 }));
    assert_eq!(socket.calls.borrow().len(), 2);
}

#[test]
fn test_hook_surfaces_selection_error() {
    let config = ServerConfig::from_toml_str("tcp_brutal = true\ntcp_brutal_rate = 500000").unwrap();
    let snapshot = ConfigSnapshot::build(&config).unwrap();
    let socket = FakeSocket {
        select_error: Some(Errno::ENOPROTOOPT),
        ..Default::default()
    };
    let err = before_serving(&snapshot, None, "/", &socket, peer()).unwrap_err();
    assert_eq!(err.category(), "congestion-selection");
    assert_eq!(socket.calls.borrow().len(), 1);
}

/// Against a real socket the outcome depends on whether the kernel has the
/// brutal module, but a params failure can never occur without selection
/// having succeeded, and the outcome must not change on a second call.
#[test]
fn test_kernel_socket_on_loopback() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let client = TcpStream::connect(listener.local_addr().unwrap()).unwrap();
    let (server_side, _) = listener.accept().unwrap();

    let socket = KernelSocket::new(server_side.as_fd());
    let first = enforce(&socket, enabled(1_000_000));
    let second = enforce(&socket, enabled(1_000_000));
    assert_eq!(first, second);

    match first {
        Ok(Enforcement::Applied { rate }) => assert_eq!(rate, 1_000_000),
        Err(EnforceError::CongestionSelection { errno }) => assert_ne!(errno, Errno::EBADF),
        other => panic!("unexpected outcome: {:?}", other),
    }

    assert_eq!(enforce(&socket, EffectivePolicy::DISABLED), Ok(Enforcement::NotApplicable));
    drop(client);
}
