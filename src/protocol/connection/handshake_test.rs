use crate::constant::{CAPABILITIES_ALWAYS_ENABLED, CapabilityFlags, ServerStatusFlags};
use crate::error::Error;
use crate::opts::{Config, Opts, SslOpts};
use crate::protocol::connection::auth::{scramble_native, scramble_sha256};
use crate::protocol::connection::handshake::*;
use crate::protocol::fixtures::*;
use crate::protocol::primitive::*;

fn config(tls: bool) -> Config {
    Config::try_from(Opts {
        user: "app".to_string(),
        password: Some("secret".to_string()),
        ssl: tls.then(SslOpts::default),
        ..Default::default()
    })
    .unwrap()
}

fn expect_write(result: HandshakeResult) -> Vec<u8> {
    match result {
        HandshakeResult::Write(payload) => payload,
        other => panic!("expected a write, got {other:?}"),
    }
}

fn client_caps() -> CapabilityFlags {
    CAPABILITIES_ALWAYS_ENABLED | CapabilityFlags::CLIENT_FOUND_ROWS
}

#[test]
fn parses_initial_handshake() {
    let handshake =
        read_initial_handshake(&greeting(server_capabilities(), "mysql_native_password")).unwrap();
    assert_eq!(handshake.protocol_version, 10);
    assert_eq!(handshake.server_version, "11.4.2-MariaDB");
    assert_eq!(handshake.connection_id, 42);
    assert_eq!(handshake.auth_plugin_data, seed().to_vec());
    assert_eq!(handshake.auth_plugin_name, b"mysql_native_password");
    assert_eq!(handshake.charset, 45);
    assert!(handshake
        .status_flags
        .contains(ServerStatusFlags::SERVER_STATUS_AUTOCOMMIT));
}

#[test]
fn greeting_err_is_authentication_failure() {
    let result = read_initial_handshake(&err(1040, "08004", "Too many connections"));
    let err = result.unwrap_err();
    assert_eq!(err.server_code(), Some(1040));
    assert!(err.is_fatal());
}

#[test]
fn handshake_response_layout() {
    let mut handshake = Handshake::new(&config(false));
    let payload = expect_write(
        handshake
            .drive(&greeting(server_capabilities(), "mysql_native_password"))
            .unwrap(),
    );

    let (caps, rest) = read_int_4(&payload).unwrap();
    assert_eq!(CapabilityFlags::from_bits_truncate(caps), client_caps());
    let (max_packet, rest) = read_int_4(rest).unwrap();
    assert_eq!(max_packet, 0x100_0000);
    let (charset, rest) = read_int_1(rest).unwrap();
    assert_eq!(charset, 224);
    let (filler, rest) = read_string_fix(rest, 23).unwrap();
    assert!(filler.iter().all(|b| *b == 0));
    let (user, rest) = read_string_null(rest).unwrap();
    assert_eq!(user, b"app");
    let (auth, rest) = read_string_lenenc(rest).unwrap();
    assert_eq!(auth, scramble_native("secret", &seed()).as_slice());
    let (plugin, rest) = read_string_null(rest).unwrap();
    assert_eq!(plugin, b"mysql_native_password");

    let (attrs, rest) = read_string_lenenc(rest).unwrap();
    assert!(rest.is_empty());
    let (key, attrs) = read_string_lenenc(attrs).unwrap();
    assert_eq!(key, b"_client_name");
    let (value, _) = read_string_lenenc(attrs).unwrap();
    assert_eq!(value, b"mariadb-wire");
}

#[test]
fn ok_completes_the_handshake() {
    let mut handshake = Handshake::new(&config(false));
    handshake
        .drive(&greeting(server_capabilities(), "mysql_native_password"))
        .unwrap();
    let HandshakeResult::Connected(server) = handshake
        .drive(&ok(0, 0, ServerStatusFlags::SERVER_STATUS_AUTOCOMMIT))
        .unwrap()
    else {
        panic!("expected connected");
    };
    assert_eq!(server.connection_id, 42);
    assert_eq!(server.capabilities, client_caps());
    assert!(server.deprecate_eof());
    assert!(server.is_mariadb());
    // nothing is expected after OK
    assert!(handshake.drive(&ok(0, 0, ServerStatusFlags::empty())).is_err());
}

#[test]
fn auth_switch_recomputes_response() {
    let mut handshake = Handshake::new(&config(false));
    handshake
        .drive(&greeting(server_capabilities(), "caching_sha2_password"))
        .unwrap();
    let new_seed = [9u8; 20];
    let payload = expect_write(
        handshake
            .drive(&auth_switch("mysql_native_password", &new_seed))
            .unwrap(),
    );
    assert_eq!(payload, scramble_native("secret", &new_seed));
    assert!(matches!(
        handshake.drive(&ok(0, 0, ServerStatusFlags::empty())).unwrap(),
        HandshakeResult::Connected(_)
    ));
}

#[test]
fn auth_switch_is_bounded() {
    let mut handshake = Handshake::new(&config(false));
    handshake
        .drive(&greeting(server_capabilities(), "mysql_native_password"))
        .unwrap();
    for _ in 0..MAX_AUTH_SWITCHES {
        expect_write(
            handshake
                .drive(&auth_switch("mysql_native_password", &seed()))
                .unwrap(),
        );
    }
    let result = handshake.drive(&auth_switch("mysql_native_password", &seed()));
    assert!(matches!(result, Err(Error::AuthSwitchLimit(3))));
}

#[test]
fn unknown_switch_plugin_is_fatal() {
    let mut handshake = Handshake::new(&config(false));
    handshake
        .drive(&greeting(server_capabilities(), "mysql_native_password"))
        .unwrap();
    let err = handshake
        .drive(&auth_switch("auth_gssapi_client", b"realm"))
        .unwrap_err();
    assert!(matches!(err, Error::UnsupportedAuthPlugin(_)));
    assert!(err.is_fatal());
}

#[test]
fn rejected_credentials() {
    let mut handshake = Handshake::new(&config(false));
    handshake
        .drive(&greeting(server_capabilities(), "mysql_native_password"))
        .unwrap();
    let err = handshake
        .drive(&err(1045, "28000", "Access denied for user 'app'@'localhost'"))
        .unwrap_err();
    assert!(matches!(&err, Error::AuthenticationFailed(e) if e.sql_state == "28000"));
    assert!(err.is_fatal());
}

#[test]
fn missing_protocol_41_is_fatal() {
    let caps = server_capabilities() - CapabilityFlags::CLIENT_PROTOCOL_41;
    let mut handshake = Handshake::new(&config(false));
    let result = handshake.drive(&greeting(caps, "mysql_native_password"));
    assert!(matches!(
        result,
        Err(Error::MissingCapability("CLIENT_PROTOCOL_41"))
    ));
}

#[test]
fn tls_requested_but_unsupported() {
    let caps = server_capabilities() - CapabilityFlags::CLIENT_SSL;
    let mut handshake = Handshake::new(&config(true));
    let result = handshake.drive(&greeting(caps, "mysql_native_password"));
    assert!(matches!(result, Err(Error::TlsError(_))));
}

#[test]
fn ssl_request_precedes_credentials() {
    let mut handshake = Handshake::new(&config(true));
    let HandshakeResult::SslRequest(request) = handshake
        .drive(&greeting(server_capabilities(), "caching_sha2_password"))
        .unwrap()
    else {
        panic!("expected ssl request");
    };
    assert_eq!(request.len(), 32);
    let (caps, _) = read_int_4(&request).unwrap();
    assert!(CapabilityFlags::from_bits_truncate(caps).contains(CapabilityFlags::CLIENT_SSL));
    assert_eq!(request[8], 224);

    // no packet may be consumed before the upgrade
    assert!(handshake.drive(&ok(0, 0, ServerStatusFlags::empty())).is_err());
}

#[test]
fn caching_sha2_full_auth_over_tls_sends_password() {
    let mut handshake = Handshake::new(&config(true));
    handshake
        .drive(&greeting(server_capabilities(), "caching_sha2_password"))
        .unwrap();
    let response = expect_write(handshake.drive_after_tls().unwrap());
    assert_eq!(response[8], 224);

    let payload = expect_write(handshake.drive(&[0x01, 0x04]).unwrap());
    assert_eq!(payload, b"secret\0");
    assert!(matches!(
        handshake.drive(&ok(0, 0, ServerStatusFlags::empty())).unwrap(),
        HandshakeResult::Connected(_)
    ));
}

#[test]
fn caching_sha2_fast_auth() {
    let mut handshake = Handshake::new(&config(false));
    let payload = expect_write(
        handshake
            .drive(&greeting(server_capabilities(), "caching_sha2_password"))
            .unwrap(),
    );
    let scramble = scramble_sha256("secret", &seed());
    assert!(payload
        .windows(scramble.len())
        .any(|window| window == scramble.as_slice()));

    assert!(matches!(
        handshake.drive(&[0x01, 0x03]).unwrap(),
        HandshakeResult::Read
    ));
    assert!(matches!(
        handshake.drive(&ok(0, 0, ServerStatusFlags::empty())).unwrap(),
        HandshakeResult::Connected(_)
    ));
}

#[test]
fn caching_sha2_full_auth_requests_public_key() {
    let mut handshake = Handshake::new(&config(false));
    handshake
        .drive(&greeting(server_capabilities(), "caching_sha2_password"))
        .unwrap();
    assert_eq!(expect_write(handshake.drive(&[0x01, 0x04]).unwrap()), vec![0x02]);

    let mut key_packet = vec![0x01];
    key_packet.extend_from_slice(RSA_PUBLIC_KEY.as_bytes());
    let encrypted = expect_write(handshake.drive(&key_packet).unwrap());
    assert_eq!(encrypted.len(), 128);

    assert!(matches!(
        handshake.drive(&ok(0, 0, ServerStatusFlags::empty())).unwrap(),
        HandshakeResult::Connected(_)
    ));
}

#[test]
fn sha256_password_switch_without_tls() {
    let mut handshake = Handshake::new(&config(false));
    handshake
        .drive(&greeting(server_capabilities(), "mysql_native_password"))
        .unwrap();
    let request = expect_write(
        handshake
            .drive(&auth_switch("sha256_password", &seed()))
            .unwrap(),
    );
    assert_eq!(request, vec![0x01]);

    let mut key_packet = vec![0x01];
    key_packet.extend_from_slice(RSA_PUBLIC_KEY.as_bytes());
    assert_eq!(expect_write(handshake.drive(&key_packet).unwrap()).len(), 128);
}

#[test]
fn auth_switch_strips_trailing_nul() {
    let packet = auth_switch("mysql_native_password", &seed());
    let switch = read_auth_switch_request(&packet).unwrap();
    assert_eq!(switch.plugin_name, b"mysql_native_password");
    assert_eq!(switch.plugin_data, seed().as_slice());
}
