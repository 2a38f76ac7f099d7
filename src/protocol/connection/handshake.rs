use tracing::{debug, warn};
use zerocopy::byteorder::little_endian::{U16 as U16LE, U32 as U32LE};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use crate::constant::{
    CAPABILITIES_REQUIRED, CLIENT_MAX_PACKET_SIZE, CapabilityFlags, ServerStatusFlags,
};
use crate::error::{Error, Result};
use crate::opts::Config;
use crate::protocol::connection::auth::{AuthPlugin, encrypt_password, nul_terminated};
use crate::protocol::primitive::*;
use crate::protocol::response::{ErrPayload, ErrPayloadBytes};

/// Plugin switches tolerated before authentication is declared stuck.
pub const MAX_AUTH_SWITCHES: usize = 3;

/// Extra-data rounds (fast-auth status, public key exchange) per plugin.
const MAX_MORE_DATA_ROUNDS: usize = 4;

#[derive(Debug, Clone, Copy, FromBytes, KnownLayout, Immutable)]
#[repr(C, packed)]
struct HandshakeFixedFields {
    connection_id: U32LE,
    auth_data_part1: [u8; 8],
    filler: u8,
    capability_flags_lower: U16LE,
    charset: u8,
    status_flags: U16LE,
    capability_flags_upper: U16LE,
    auth_data_len: u8,
}

#[derive(Debug, Clone)]
pub struct InitialHandshake {
    pub protocol_version: u8,
    pub server_version: String,
    pub connection_id: u32,
    pub auth_plugin_data: Vec<u8>,
    pub capability_flags: CapabilityFlags,
    pub charset: u8,
    pub status_flags: ServerStatusFlags,
    pub auth_plugin_name: Vec<u8>,
}

/// Read the initial handshake (protocol version 10) sent by the server.
///
/// An ERR packet in its place (host blocked, too many connections) is an
/// authentication failure.
pub fn read_initial_handshake(payload: &[u8]) -> Result<InitialHandshake> {
    let (protocol_version, data) = read_int_1(payload)?;
    match protocol_version {
        0xFF => {
            return Err(Error::AuthenticationFailed(ErrPayload::try_from(
                ErrPayloadBytes(payload),
            )?));
        }
        10 => {}
        other => {
            return Err(Error::ProtocolError(format!(
                "unsupported handshake protocol version {other}"
            )));
        }
    }

    let (server_version, data) = read_string_null(data)?;
    let (fixed, rest) =
        HandshakeFixedFields::ref_from_prefix(data).map_err(|_| Error::UnexpectedEof)?;

    let cap_bits = (u32::from(fixed.capability_flags_upper.get()) << 16)
        | u32::from(fixed.capability_flags_lower.get());
    let capability_flags = CapabilityFlags::from_bits_truncate(cap_bits);

    // 6 bytes filler, then 4 bytes of MariaDB extended capabilities
    let (_reserved, data) = read_string_fix(rest, 10)?;

    let mut auth_plugin_data = fixed.auth_data_part1.to_vec();
    let mut data = data;
    if capability_flags.contains(CapabilityFlags::CLIENT_SECURE_CONNECTION) {
        let auth_data_2_len = usize::from(fixed.auth_data_len).saturating_sub(9).max(12);
        let (auth_data_2, rest) = read_string_fix(data, auth_data_2_len)?;
        let (_reserved, rest) = read_int_1(rest)?;
        auth_plugin_data.extend_from_slice(auth_data_2);
        data = rest;
    }

    // some servers omit the terminating NUL of the plugin name
    let auth_plugin_name = match read_string_null(data) {
        Ok((name, _)) => name.to_vec(),
        Err(_) => data.to_vec(),
    };

    Ok(InitialHandshake {
        protocol_version,
        server_version: String::from_utf8_lossy(server_version).into_owned(),
        connection_id: fixed.connection_id.get(),
        auth_plugin_data,
        capability_flags,
        charset: fixed.charset,
        status_flags: ServerStatusFlags::from_bits_truncate(fixed.status_flags.get()),
        auth_plugin_name,
    })
}

/// Handshake response packet sent by client (HandshakeResponse41)
#[derive(Debug, Clone)]
pub struct HandshakeResponse41<'a> {
    pub capability_flags: CapabilityFlags,
    pub max_packet_size: u32,
    pub charset: u8,
    pub username: &'a str,
    pub auth_response: &'a [u8],
    pub database: Option<&'a str>,
    pub auth_plugin_name: &'a str,
    pub attributes: &'a [(String, String)],
}

pub fn write_handshake_response(out: &mut Vec<u8>, response: &HandshakeResponse41) {
    let caps = response.capability_flags;
    write_int_4(out, caps.bits());
    write_int_4(out, response.max_packet_size);
    write_int_1(out, response.charset);
    out.extend_from_slice(&[0u8; 23]);
    write_string_null(out, response.username);

    if caps.contains(CapabilityFlags::CLIENT_PLUGIN_AUTH_LENENC_CLIENT_DATA) {
        write_bytes_lenenc(out, response.auth_response);
    } else {
        // SECURE_CONNECTION: one length byte, scrambles are at most 32 bytes
        let len = response.auth_response.len().min(0xFF);
        write_int_1(out, len as u8);
        out.extend_from_slice(&response.auth_response[..len]);
    }

    if let Some(db) = response.database
        && caps.contains(CapabilityFlags::CLIENT_CONNECT_WITH_DB)
    {
        write_string_null(out, db);
    }

    if caps.contains(CapabilityFlags::CLIENT_PLUGIN_AUTH) {
        write_string_null(out, response.auth_plugin_name);
    }

    if caps.contains(CapabilityFlags::CLIENT_CONNECT_ATTRS) {
        let mut attrs = Vec::new();
        for (key, value) in response.attributes {
            write_string_lenenc(&mut attrs, key);
            write_string_lenenc(&mut attrs, value);
        }
        write_bytes_lenenc(out, &attrs);
    }
}

#[repr(C, packed)]
#[derive(Debug, Clone, Copy, FromBytes, KnownLayout, Immutable, IntoBytes)]
struct SslRequest {
    client_flag: U32LE,
    max_packet_size: U32LE,
    character_set: u8,
    filler: [u8; 23],
}

/// Write the SSL request sent before upgrading the transport.
///
/// It is the first 32 bytes of the handshake response, without credentials.
pub fn write_ssl_request(out: &mut Vec<u8>, capability_flags: CapabilityFlags, charset: u8) {
    let request = SslRequest {
        client_flag: U32LE::new(capability_flags.bits()),
        max_packet_size: U32LE::new(CLIENT_MAX_PACKET_SIZE),
        character_set: charset,
        filler: [0; 23],
    };
    out.extend_from_slice(request.as_bytes());
}

/// Auth switch request from server (0xFE with a plugin name)
#[derive(Debug, Clone)]
pub struct AuthSwitchRequest<'a> {
    pub plugin_name: &'a [u8],
    pub plugin_data: &'a [u8],
}

pub fn read_auth_switch_request(payload: &[u8]) -> Result<AuthSwitchRequest<'_>> {
    let (header, data) = read_int_1(payload)?;
    if header != 0xFE {
        return Err(Error::InvalidPacket);
    }
    let (plugin_name, data) = read_string_null(data)?;
    let plugin_data = data.strip_suffix(&[0]).unwrap_or(data);
    Ok(AuthSwitchRequest {
        plugin_name,
        plugin_data,
    })
}

/// What the server told us about itself, plus the negotiated capabilities
#[derive(Debug, Clone)]
pub struct ServerInfo {
    pub server_version: String,
    pub connection_id: u32,
    pub server_capabilities: CapabilityFlags,
    /// Capabilities in effect for this connection (client ∩ server)
    pub capabilities: CapabilityFlags,
    /// Server default collation id
    pub charset: u8,
    pub status_flags: ServerStatusFlags,
}

impl ServerInfo {
    pub fn is_mariadb(&self) -> bool {
        self.server_version.contains("MariaDB") || self.server_capabilities.is_mariadb()
    }

    pub fn deprecate_eof(&self) -> bool {
        self.capabilities
            .contains(CapabilityFlags::CLIENT_DEPRECATE_EOF)
    }
}

/// Result of driving the handshake state machine
#[derive(Debug)]
pub enum HandshakeResult {
    /// Write this payload, then read the next packet
    Write(Vec<u8>),
    /// Nothing to send; read the next packet
    Read,
    /// Write this SSL request, upgrade the transport, then call
    /// [`Handshake::drive_after_tls`]
    SslRequest(Vec<u8>),
    /// Authentication succeeded
    Connected(ServerInfo),
}

struct AuthRound {
    plugin: AuthPlugin,
    seed: Vec<u8>,
    switches: usize,
    rounds: usize,
    awaiting_public_key: bool,
}

enum State {
    /// Waiting for the initial handshake from the server
    Start,
    /// SSL request written; the transport must be upgraded before continuing
    WaitingTlsUpgrade { plugin: AuthPlugin, seed: Vec<u8> },
    /// Handshake response or an auth round written, waiting for the server
    WaitingAuthResult(AuthRound),
    Connected,
}

/// State machine for the connection phase.
///
/// Pure parsing and packet generation without I/O: the caller writes what
/// [`HandshakeResult`] asks for and feeds every packet it reads to
/// [`Handshake::drive`].
pub struct Handshake {
    user: String,
    password: String,
    database: Option<String>,
    capabilities: CapabilityFlags,
    charset: u8,
    tls: bool,
    attributes: Vec<(String, String)>,
    tls_active: bool,
    server: Option<ServerInfo>,
    state: State,
}

impl Handshake {
    pub fn new(config: &Config) -> Self {
        let mut attributes = vec![
            ("_client_name".to_string(), env!("CARGO_PKG_NAME").to_string()),
            ("_client_version".to_string(), env!("CARGO_PKG_VERSION").to_string()),
            ("_os".to_string(), std::env::consts::OS.to_string()),
            ("_pid".to_string(), std::process::id().to_string()),
        ];
        attributes.extend(config.connect_attributes.iter().cloned());

        Self {
            user: config.user.clone(),
            password: config.password.clone(),
            database: config.db.clone(),
            capabilities: config.capabilities(),
            charset: config.collation.handshake_id(),
            tls: config.tls.is_some(),
            attributes,
            tls_active: false,
            server: None,
            state: State::Start,
        }
    }

    /// Feed the next packet read from the server.
    pub fn drive(&mut self, payload: &[u8]) -> Result<HandshakeResult> {
        match std::mem::replace(&mut self.state, State::Connected) {
            State::Start => self.on_initial_handshake(payload),
            State::WaitingAuthResult(round) => self.on_auth_result(round, payload),
            State::WaitingTlsUpgrade { .. } | State::Connected => Err(Error::ProtocolError(
                "unexpected packet during connection phase".to_string(),
            )),
        }
    }

    /// Continue after the transport was upgraded to TLS.
    pub fn drive_after_tls(&mut self) -> Result<HandshakeResult> {
        match std::mem::replace(&mut self.state, State::Connected) {
            State::WaitingTlsUpgrade { plugin, seed } => {
                self.tls_active = true;
                Ok(HandshakeResult::Write(self.start_auth(plugin, seed)))
            }
            _ => Err(Error::ProtocolError(
                "TLS upgrade was not requested".to_string(),
            )),
        }
    }

    fn on_initial_handshake(&mut self, payload: &[u8]) -> Result<HandshakeResult> {
        let handshake = read_initial_handshake(payload)?;
        let server_caps = handshake.capability_flags;

        if !server_caps.contains(CapabilityFlags::CLIENT_PROTOCOL_41) {
            return Err(Error::MissingCapability("CLIENT_PROTOCOL_41"));
        }
        if !server_caps.contains(CAPABILITIES_REQUIRED) {
            return Err(Error::MissingCapability("CLIENT_SECURE_CONNECTION"));
        }
        if self.tls && !server_caps.contains(CapabilityFlags::CLIENT_SSL) {
            return Err(Error::TlsError(
                "server does not support TLS connections".to_string(),
            ));
        }

        let negotiated = self.capabilities & server_caps;
        debug!(
            server_version = %handshake.server_version,
            connection_id = handshake.connection_id,
            plugin = %String::from_utf8_lossy(&handshake.auth_plugin_name),
            "initial handshake"
        );

        // an unknown default plugin is answered with native password; the
        // server switches us to what the account actually uses
        let plugin = AuthPlugin::from_name(&handshake.auth_plugin_name)
            .unwrap_or(AuthPlugin::MysqlNativePassword);
        let seed = handshake.auth_plugin_data;

        self.server = Some(ServerInfo {
            server_version: handshake.server_version,
            connection_id: handshake.connection_id,
            server_capabilities: server_caps,
            capabilities: negotiated,
            charset: handshake.charset,
            status_flags: handshake.status_flags,
        });

        if self.tls {
            let mut request = Vec::with_capacity(32);
            write_ssl_request(&mut request, negotiated, self.charset);
            self.state = State::WaitingTlsUpgrade { plugin, seed };
            return Ok(HandshakeResult::SslRequest(request));
        }

        Ok(HandshakeResult::Write(self.start_auth(plugin, seed)))
    }

    fn negotiated(&self) -> CapabilityFlags {
        self.server
            .as_ref()
            .map_or(CapabilityFlags::empty(), |server| server.capabilities)
    }

    fn start_auth(&mut self, plugin: AuthPlugin, seed: Vec<u8>) -> Vec<u8> {
        if plugin == AuthPlugin::ClearPassword && !self.tls_active {
            warn!("sending password in clear text over an unencrypted connection");
        }
        let auth_response = plugin.initial_response(&self.password, &seed, self.tls_active);
        let response = HandshakeResponse41 {
            capability_flags: self.negotiated(),
            max_packet_size: CLIENT_MAX_PACKET_SIZE,
            charset: self.charset,
            username: &self.user,
            auth_response: &auth_response,
            database: self.database.as_deref(),
            auth_plugin_name: plugin.name(),
            attributes: &self.attributes,
        };
        let mut out = Vec::new();
        write_handshake_response(&mut out, &response);

        self.state = State::WaitingAuthResult(AuthRound {
            plugin,
            seed,
            switches: 0,
            rounds: 0,
            awaiting_public_key: false,
        });
        out
    }

    fn on_auth_result(&mut self, mut round: AuthRound, payload: &[u8]) -> Result<HandshakeResult> {
        match payload.first() {
            Some(0x00) => {
                let server = self.server.take().ok_or(Error::InvalidPacket)?;
                debug!(connection_id = server.connection_id, "authenticated");
                self.state = State::Connected;
                Ok(HandshakeResult::Connected(server))
            }
            Some(0xFF) => Err(Error::AuthenticationFailed(ErrPayload::try_from(
                ErrPayloadBytes(payload),
            )?)),
            Some(0xFE) if payload.len() == 1 => Err(Error::UnsupportedAuthPlugin(
                "mysql_old_password".to_string(),
            )),
            Some(0xFE) => {
                round.switches += 1;
                if round.switches > MAX_AUTH_SWITCHES {
                    return Err(Error::AuthSwitchLimit(MAX_AUTH_SWITCHES));
                }
                let switch = read_auth_switch_request(payload)?;
                let plugin = AuthPlugin::from_name(switch.plugin_name)?;
                debug!(plugin = plugin.name(), "auth switch");
                if plugin == AuthPlugin::ClearPassword && !self.tls_active {
                    warn!("sending password in clear text over an unencrypted connection");
                }

                round.plugin = plugin;
                round.seed = switch.plugin_data.to_vec();
                round.rounds = 0;
                round.awaiting_public_key = false;
                let response = plugin.initial_response(&self.password, &round.seed, self.tls_active);
                self.state = State::WaitingAuthResult(round);
                Ok(HandshakeResult::Write(response))
            }
            Some(0x01) => {
                round.rounds += 1;
                if round.rounds > MAX_MORE_DATA_ROUNDS {
                    return Err(Error::ProtocolError(
                        "authentication exchange did not converge".to_string(),
                    ));
                }
                let result = self.on_more_data(&mut round, &payload[1..])?;
                self.state = State::WaitingAuthResult(round);
                Ok(result)
            }
            _ => Err(Error::InvalidPacket),
        }
    }

    fn on_more_data(&self, round: &mut AuthRound, data: &[u8]) -> Result<HandshakeResult> {
        match round.plugin {
            AuthPlugin::CachingSha2Password if !round.awaiting_public_key => match data {
                // fast auth succeeded, OK follows
                [0x03] => Ok(HandshakeResult::Read),
                [0x04] if self.tls_active => {
                    Ok(HandshakeResult::Write(nul_terminated(&self.password)))
                }
                [0x04] => {
                    round.awaiting_public_key = true;
                    Ok(HandshakeResult::Write(vec![0x02]))
                }
                _ => Err(Error::ProtocolError(
                    "unexpected caching_sha2_password status".to_string(),
                )),
            },
            AuthPlugin::CachingSha2Password | AuthPlugin::Sha256Password => {
                round.awaiting_public_key = false;
                let encrypted = encrypt_password(&self.password, &round.seed, data)?;
                Ok(HandshakeResult::Write(encrypted))
            }
            plugin => Err(Error::ProtocolError(format!(
                "unexpected extra auth data for {}",
                plugin.name()
            ))),
        }
    }
}
