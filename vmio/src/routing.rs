//! Per-security-level package routing.
//!
//! A [`RoutingTable`] maps each [`CommandId`] to the [`Route`] its packages
//! must travel on: a default route plus point and range overrides. Tables
//! for the built-in security levels are built once per process and shared
//! read-only between every channel of that level.
//!
//! Lookup order is point override, then range override, then default.
//! Lookup never fails.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::OnceLock;

use serde::{Deserialize, Serialize};
use vmio_proto::{CommandId, CommandRange};

use crate::error::{Error, Result};

/// Maximum number of overrides a table may hold.
pub const MAX_ROUTES: usize = 20;

/// Commands that always travel encrypted under [`SecurityLevel::Normal`].
pub const SENSITIVE_COMMANDS: [CommandId; 4] = [
    CommandId::IO_CLI_KEYBOARD_SCANCODE,
    CommandId::IO_CLI_TOOLS_CLIPBOARD_DATA,
    CommandId::IO_CLI_AUTHENTICATE_SESSION,
    CommandId::IO_CLI_ATTACH_TO_VM,
];

/// Serialized header: default transport, default requirement, route count.
const HEADER_LEN: usize = 4 + 4 + 1;
/// Serialized route: begin, end, transport, requirement.
const ROUTE_LEN: usize = 4 * 4;

/// How aggressively traffic must be encrypted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[non_exhaustive]
pub enum SecurityLevel {
    /// Plain transport everywhere.
    Low,
    /// Encrypt sensitive input and every management command.
    #[default]
    Normal,
    /// Encrypt everything.
    High,
}

impl SecurityLevel {
    /// All levels, lowest first.
    pub const ALL: [Self; 3] = [Self::Low, Self::Normal, Self::High];

    /// Cache slot for the per-level table singletons.
    const fn slot(self) -> usize {
        match self {
            Self::Low => 0,
            Self::Normal => 1,
            Self::High => 2,
        }
    }
}

impl fmt::Display for SecurityLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Low => "low",
            Self::Normal => "normal",
            Self::High => "high",
        })
    }
}

impl std::str::FromStr for SecurityLevel {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "low" => Ok(Self::Low),
            "normal" => Ok(Self::Normal),
            "high" => Ok(Self::High),
            _ => Err(format!("unknown security level: {s}")),
        }
    }
}

/// Physical transport a route resolves to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[non_exhaustive]
pub enum TransportKind {
    /// Unencrypted stream.
    Plain,
    /// TLS-wrapped stream.
    Encrypted,
}

impl TransportKind {
    /// Wire value.
    const fn to_wire(self) -> u32 {
        match self {
            Self::Plain => 1,
            Self::Encrypted => 2,
        }
    }

    /// Parses a wire value. `0` (unknown) and anything else is rejected.
    const fn from_wire(v: u32) -> Option<Self> {
        match v {
            1 => Some(Self::Plain),
            2 => Some(Self::Encrypted),
            _ => None,
        }
    }
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Plain => "plain",
            Self::Encrypted => "encrypted",
        })
    }
}

/// Whether a route may be renegotiated with the peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[non_exhaustive]
pub enum Requirement {
    /// The peer may pick another known transport.
    Optional,
    /// The route is mandatory.
    Required,
}

impl Requirement {
    /// Wire value.
    const fn to_wire(self) -> u32 {
        match self {
            Self::Optional => 0,
            Self::Required => 1,
        }
    }

    /// Parses a wire value.
    const fn from_wire(v: u32) -> Option<Self> {
        match v {
            0 => Some(Self::Optional),
            1 => Some(Self::Required),
            _ => None,
        }
    }
}

impl fmt::Display for Requirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Optional => "optional",
            Self::Required => "required",
        })
    }
}

/// A transport paired with its requirement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Route {
    /// Transport the package travels on.
    pub transport: TransportKind,
    /// Whether the transport is mandatory.
    pub requirement: Requirement,
}

impl Route {
    /// Plain, mandatory.
    pub const PLAIN_REQUIRED: Self = Self::new(TransportKind::Plain, Requirement::Required);
    /// Plain, negotiable.
    pub const PLAIN_OPTIONAL: Self = Self::new(TransportKind::Plain, Requirement::Optional);
    /// Encrypted, mandatory.
    pub const ENCRYPTED_REQUIRED: Self =
        Self::new(TransportKind::Encrypted, Requirement::Required);
    /// Encrypted, negotiable.
    pub const ENCRYPTED_OPTIONAL: Self =
        Self::new(TransportKind::Encrypted, Requirement::Optional);

    /// Creates a route.
    pub const fn new(transport: TransportKind, requirement: Requirement) -> Self {
        Self {
            transport,
            requirement,
        }
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.transport, self.requirement)
    }
}

/// Default route plus point and range overrides.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutingTable {
    /// Route for commands with no override.
    default: Route,
    /// Transports this side can carry, used during negotiation.
    known: BTreeSet<TransportKind>,
    /// Overrides keyed by range. Point overrides have `start == end`.
    routes: BTreeMap<CommandRange, Route>,
}

impl RoutingTable {
    /// Creates a table with only a default route.
    pub fn new(default: Route) -> Self {
        Self {
            default,
            known: BTreeSet::from([default.transport]),
            routes: BTreeMap::new(),
        }
    }

    /// Marks `transport` as available without routing anything to it.
    #[must_use]
    pub fn with_transport(mut self, transport: TransportKind) -> Self {
        self.known.insert(transport);
        self
    }

    /// Adds a point override for `cmd`.
    ///
    /// A point override may sit inside a range override and takes priority
    /// over it; a second override for the same command is rejected.
    pub fn add_route(&mut self, cmd: CommandId, route: Route) -> Result<()> {
        self.insert(CommandRange::point(cmd), route)
    }

    /// Adds a range override. Ranges may not overlap each other.
    pub fn add_range_route(&mut self, range: CommandRange, route: Route) -> Result<()> {
        self.insert(range, route)
    }

    /// Validating insert shared by point and range overrides.
    fn insert(&mut self, range: CommandRange, route: Route) -> Result<()> {
        if range.start > range.end {
            return Err(Error::InvertedRange(range));
        }
        if self.routes.len() >= MAX_ROUTES {
            return Err(Error::RoutingTableFull { max: MAX_ROUTES });
        }
        if self.routes.contains_key(&range) {
            return Err(Error::DuplicateRoute(range));
        }
        if !range.is_point()
            && let Some(&existing) = self
                .routes
                .keys()
                .find(|r| !r.is_point() && r.overlaps(range))
        {
            return Err(Error::OverlappingRoute {
                new: range,
                existing,
            });
        }
        self.routes.insert(range, route);
        self.known.insert(route.transport);
        Ok(())
    }

    /// Resolves the route for `cmd`: point, then range, then default.
    pub fn resolve(&self, cmd: CommandId) -> Route {
        if let Some(&route) = self.routes.get(&CommandRange::point(cmd)) {
            return route;
        }
        self.routes
            .iter()
            .find(|(range, _)| range.contains(cmd))
            .map_or(self.default, |(_, &route)| route)
    }

    /// Route for commands with no override.
    pub const fn default_route(&self) -> Route {
        self.default
    }

    /// Overrides in ascending range order.
    pub fn routes(&self) -> impl Iterator<Item = (CommandRange, Route)> + '_ {
        self.routes.iter().map(|(&range, &route)| (range, route))
    }

    /// Transports this side can carry.
    pub fn transports(&self) -> impl Iterator<Item = TransportKind> + '_ {
        self.known.iter().copied()
    }

    /// Builds the client table for `level`.
    ///
    /// # Panics
    ///
    /// Panics if the built-in overrides collide. That is a defect in this
    /// module and is never recoverable at runtime.
    pub fn build(level: SecurityLevel) -> Self {
        Self::built_in(level, Self::client_recipe)
    }

    /// Builds the server table for `level`.
    ///
    /// Server tables mirror the client ones but leave plain routes optional
    /// so that a client may upgrade them during negotiation.
    ///
    /// # Panics
    ///
    /// Same as [`RoutingTable::build`].
    pub fn build_server(level: SecurityLevel) -> Self {
        Self::built_in(level, Self::server_recipe)
    }

    /// Shared client table for `level`, built on first use.
    pub fn client(level: SecurityLevel) -> &'static Self {
        static TABLES: [OnceLock<RoutingTable>; 3] = [const { OnceLock::new() }; 3];
        TABLES[level.slot()].get_or_init(|| Self::build(level))
    }

    /// Shared server table for `level`, built on first use.
    pub fn server(level: SecurityLevel) -> &'static Self {
        static TABLES: [OnceLock<RoutingTable>; 3] = [const { OnceLock::new() }; 3];
        TABLES[level.slot()].get_or_init(|| Self::build_server(level))
    }

    /// Runs a built-in table recipe, aborting on a configuration defect.
    #[allow(clippy::panic)]
    fn built_in(level: SecurityLevel, recipe: fn(SecurityLevel) -> Result<Self>) -> Self {
        match recipe(level) {
            Ok(table) => table,
            Err(e) => panic!("built-in {level} routing table is inconsistent: {e}"),
        }
    }

    /// Client table recipe.
    fn client_recipe(level: SecurityLevel) -> Result<Self> {
        match level {
            SecurityLevel::Low => Ok(Self::new(Route::PLAIN_REQUIRED)),
            SecurityLevel::Normal => {
                let mut table = Self::new(Route::PLAIN_REQUIRED);
                table.add_encrypted_overrides()?;
                Ok(table)
            }
            SecurityLevel::High => Ok(Self::new(Route::ENCRYPTED_REQUIRED)),
        }
    }

    /// Server table recipe.
    fn server_recipe(level: SecurityLevel) -> Result<Self> {
        match level {
            SecurityLevel::Low => {
                Ok(Self::new(Route::PLAIN_OPTIONAL).with_transport(TransportKind::Encrypted))
            }
            SecurityLevel::Normal => {
                let mut table = Self::new(Route::PLAIN_OPTIONAL);
                table.add_encrypted_overrides()?;
                Ok(table)
            }
            SecurityLevel::High => Ok(Self::new(Route::ENCRYPTED_REQUIRED)),
        }
    }

    /// Forces sensitive commands and every command range onto encryption.
    fn add_encrypted_overrides(&mut self) -> Result<()> {
        for cmd in SENSITIVE_COMMANDS {
            self.add_route(cmd, Route::ENCRYPTED_REQUIRED)?;
        }
        for range in CommandRange::ALL {
            self.add_range_route(range, Route::ENCRYPTED_REQUIRED)?;
        }
        Ok(())
    }

    /// Negotiates the table a peer proposed against ours.
    ///
    /// Returns the table both sides will use, or `None` when a required
    /// route on either side cannot be honoured.
    pub fn accept(&self, peer: &Self) -> Option<Self> {
        let default = self.accept_pair(self.default, peer.default)?;
        let mut out = Self::new(default);

        // Ranges the peer never mentioned fall back to what it will actually use.
        let fill = match self.default.requirement {
            Requirement::Optional => default,
            Requirement::Required => self.default,
        };
        let mut theirs = peer.routes.clone();
        for &range in self.routes.keys() {
            theirs.entry(range).or_insert(fill);
        }

        for (range, their) in theirs {
            let route = match self.routes.get(&range) {
                Some(&ours) => self.accept_pair(ours, their)?,
                None if self.known.contains(&their.transport) => their,
                None if their.requirement == Requirement::Optional => default,
                None => return None,
            };
            out.routes.insert(range, route);
            out.known.insert(route.transport);
        }
        Some(out)
    }

    /// Picks the route both sides agree on for one key.
    fn accept_pair(&self, ours: Route, theirs: Route) -> Option<Route> {
        match ours.requirement {
            Requirement::Optional => {
                if self.known.contains(&theirs.transport) {
                    Some(theirs)
                } else if theirs.requirement == Requirement::Optional {
                    Some(ours)
                } else {
                    None
                }
            }
            Requirement::Required => {
                (ours.transport == theirs.transport || theirs.requirement == Requirement::Optional)
                    .then_some(ours)
            }
        }
    }

    /// Serializes the table for exchange with a peer.
    ///
    /// Layout, little-endian: `default transport u32`, `default requirement
    /// u32`, `count u8`, then `count` routes of `begin u32`, `end u32`,
    /// `transport u32`, `requirement u32`.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(HEADER_LEN + ROUTE_LEN * self.routes.len());
        buf.extend_from_slice(&self.default.transport.to_wire().to_le_bytes());
        buf.extend_from_slice(&self.default.requirement.to_wire().to_le_bytes());
        buf.push(u8::try_from(self.routes.len()).unwrap_or(u8::MAX));
        for (range, route) in &self.routes {
            for word in [
                range.start.0,
                range.end.0,
                route.transport.to_wire(),
                route.requirement.to_wire(),
            ] {
                buf.extend_from_slice(&word.to_le_bytes());
            }
        }
        buf
    }

    /// Parses a table produced by [`RoutingTable::to_bytes`].
    ///
    /// The buffer length must match the declared route count exactly and
    /// every route must pass the same checks as [`RoutingTable::add_route`].
    pub fn from_bytes(buf: &[u8]) -> Result<Self> {
        let header = buf
            .get(..HEADER_LEN)
            .ok_or(Error::MalformedTable("short header"))?;
        let count = usize::from(header[8]);
        if count > MAX_ROUTES {
            return Err(Error::MalformedTable("too many routes"));
        }
        if buf.len() != HEADER_LEN + ROUTE_LEN * count {
            return Err(Error::MalformedTable("size does not match route count"));
        }

        let mut table = Self::new(decode_route(word(header, 0), word(header, 4))?);
        for chunk in buf[HEADER_LEN..].chunks_exact(ROUTE_LEN) {
            let range = CommandRange::new(word(chunk, 0), word(chunk, 4));
            table.insert(range, decode_route(word(chunk, 8), word(chunk, 12))?)?;
        }
        Ok(table)
    }
}

/// Reads the little-endian `u32` at `at`. Callers guarantee the bounds.
fn word(buf: &[u8], at: usize) -> u32 {
    let mut raw = [0u8; 4];
    raw.copy_from_slice(&buf[at..at + 4]);
    u32::from_le_bytes(raw)
}

/// Decodes a wire `(transport, requirement)` pair.
fn decode_route(transport: u32, requirement: u32) -> Result<Route> {
    let transport =
        TransportKind::from_wire(transport).ok_or(Error::MalformedTable("unknown transport"))?;
    let requirement =
        Requirement::from_wire(requirement).ok_or(Error::MalformedTable("unknown requirement"))?;
    Ok(Route::new(transport, requirement))
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    /// Expected Normal-level route for any command.
    fn normal_expectation(cmd: CommandId) -> Route {
        if SENSITIVE_COMMANDS.contains(&cmd) || cmd.range().is_some() {
            Route::ENCRYPTED_REQUIRED
        } else {
            Route::PLAIN_REQUIRED
        }
    }

    proptest! {
        #[test]
        fn high_encrypts_everything(raw in any::<u32>()) {
            let table = RoutingTable::client(SecurityLevel::High);
            prop_assert_eq!(table.resolve(CommandId(raw)), Route::ENCRYPTED_REQUIRED);
        }

        #[test]
        fn low_is_plain_everywhere(raw in any::<u32>()) {
            let table = RoutingTable::client(SecurityLevel::Low);
            prop_assert_eq!(table.resolve(CommandId(raw)), Route::PLAIN_REQUIRED);
        }

        #[test]
        fn normal_encrypts_ranges_and_sensitive_input(raw in 0u32..12_000) {
            let cmd = CommandId(raw);
            let table = RoutingTable::client(SecurityLevel::Normal);
            prop_assert_eq!(table.resolve(cmd), normal_expectation(cmd));
        }
    }

    #[test]
    fn low_keeps_sensitive_commands_plain() {
        let table = RoutingTable::build(SecurityLevel::Low);
        for cmd in SENSITIVE_COMMANDS {
            assert_eq!(table.resolve(cmd), Route::PLAIN_REQUIRED);
        }
    }

    #[test]
    fn normal_range_edges() {
        let table = RoutingTable::build(SecurityLevel::Normal);
        for range in CommandRange::ALL {
            assert_eq!(table.resolve(range.start), Route::ENCRYPTED_REQUIRED);
            assert_eq!(table.resolve(range.end), Route::ENCRYPTED_REQUIRED);
        }
        assert_eq!(table.resolve(CommandId(999)), Route::PLAIN_REQUIRED);
        assert_eq!(table.resolve(CommandId(7001)), Route::PLAIN_REQUIRED);
        assert_eq!(table.resolve(CommandId::ILLEGAL), Route::PLAIN_REQUIRED);
    }

    #[test]
    fn sensitive_and_unlisted_commands_on_normal() {
        let table = RoutingTable::build(SecurityLevel::Normal);
        assert_eq!(
            table.resolve(CommandId::IO_CLI_KEYBOARD_SCANCODE),
            Route::ENCRYPTED_REQUIRED
        );
        assert_eq!(
            table.resolve(CommandId::IO_STDOUT_PORTION),
            Route::PLAIN_REQUIRED
        );
    }

    #[test]
    fn duplicate_point_route_is_rejected() {
        let mut table = RoutingTable::new(Route::PLAIN_REQUIRED);
        table
            .add_route(CommandId::VM_START, Route::ENCRYPTED_REQUIRED)
            .unwrap();
        let err = table
            .add_route(CommandId::VM_START, Route::PLAIN_OPTIONAL)
            .unwrap_err();
        assert!(matches!(err, Error::DuplicateRoute(r) if r == CommandRange::point(CommandId::VM_START)));
        // The first rule stays in place.
        assert_eq!(table.resolve(CommandId::VM_START), Route::ENCRYPTED_REQUIRED);
    }

    #[test]
    #[should_panic(expected = "built-in normal routing table is inconsistent")]
    fn faulty_built_in_recipe_panics() {
        RoutingTable::built_in(SecurityLevel::Normal, |_| {
            let mut table = RoutingTable::new(Route::PLAIN_REQUIRED);
            table.add_route(CommandId::VM_START, Route::ENCRYPTED_REQUIRED)?;
            table.add_route(CommandId::VM_START, Route::PLAIN_OPTIONAL)?;
            Ok(table)
        });
    }

    #[test]
    fn built_in_recipes_all_build() {
        for level in [SecurityLevel::Low, SecurityLevel::Normal, SecurityLevel::High] {
            assert!(RoutingTable::client_recipe(level).is_ok());
            assert!(RoutingTable::server_recipe(level).is_ok());
        }
    }

    #[test]
    fn point_overrides_beat_ranges() {
        let mut table = RoutingTable::new(Route::PLAIN_REQUIRED);
        table
            .add_range_route(CommandRange::CLIENT_TO_VM, Route::ENCRYPTED_REQUIRED)
            .unwrap();
        table
            .add_route(CommandId::VM_GET_STATE, Route::PLAIN_OPTIONAL)
            .unwrap();
        assert_eq!(table.resolve(CommandId::VM_GET_STATE), Route::PLAIN_OPTIONAL);
        assert_eq!(table.resolve(CommandId::VM_START), Route::ENCRYPTED_REQUIRED);
    }

    #[test]
    fn range_checks() {
        let mut table = RoutingTable::new(Route::PLAIN_REQUIRED);
        table
            .add_range_route(CommandRange::new(100, 200), Route::ENCRYPTED_REQUIRED)
            .unwrap();
        assert!(matches!(
            table.add_range_route(CommandRange::new(150, 300), Route::ENCRYPTED_REQUIRED),
            Err(Error::OverlappingRoute { .. })
        ));
        assert!(matches!(
            table.add_range_route(CommandRange::new(50, 500), Route::ENCRYPTED_REQUIRED),
            Err(Error::OverlappingRoute { .. })
        ));
        assert!(matches!(
            table.add_range_route(CommandRange::new(9, 3), Route::ENCRYPTED_REQUIRED),
            Err(Error::InvertedRange(_))
        ));
    }

    #[test]
    fn table_is_bounded() {
        let mut table = RoutingTable::new(Route::PLAIN_REQUIRED);
        for i in 0..20u32 {
            table.add_route(CommandId(i), Route::ENCRYPTED_REQUIRED).unwrap();
        }
        assert!(matches!(
            table.add_route(CommandId(20), Route::ENCRYPTED_REQUIRED),
            Err(Error::RoutingTableFull { max: 20 })
        ));
    }

    #[test]
    fn cached_tables_are_built_once() {
        let a = RoutingTable::client(SecurityLevel::Normal);
        let b = RoutingTable::client(SecurityLevel::Normal);
        assert!(std::ptr::eq(a, b));
        assert_eq!(*a, RoutingTable::build(SecurityLevel::Normal));
    }

    #[test]
    fn wire_form_is_exact() {
        let table = RoutingTable::build(SecurityLevel::Normal);
        let bytes = table.to_bytes();
        assert_eq!(bytes.len(), 9 + 16 * 10);
        assert_eq!(&bytes[..4], &1u32.to_le_bytes());
        assert_eq!(bytes[8], 10);
        assert_eq!(RoutingTable::from_bytes(&bytes).unwrap(), table);

        assert!(RoutingTable::from_bytes(&bytes[..bytes.len() - 1]).is_err());
        assert!(RoutingTable::from_bytes(&bytes[..5]).is_err());

        let mut unknown = RoutingTable::new(Route::PLAIN_REQUIRED).to_bytes();
        unknown[0] = 0;
        assert!(matches!(
            RoutingTable::from_bytes(&unknown),
            Err(Error::MalformedTable("unknown transport"))
        ));
    }

    #[test]
    fn normal_client_accepts_normal_server() {
        let server = RoutingTable::server(SecurityLevel::Normal);
        let client = RoutingTable::client(SecurityLevel::Normal);
        let agreed = server.accept(client).unwrap();
        assert_eq!(agreed.default_route(), Route::PLAIN_REQUIRED);
        assert_eq!(agreed.resolve(CommandId::VM_START), Route::ENCRYPTED_REQUIRED);
        assert_eq!(
            agreed.resolve(CommandId::IO_CLI_ATTACH_TO_VM),
            Route::ENCRYPTED_REQUIRED
        );
    }

    #[test]
    fn low_server_accepts_high_client() {
        let server = RoutingTable::server(SecurityLevel::Low);
        let agreed = server
            .accept(RoutingTable::client(SecurityLevel::High))
            .unwrap();
        assert_eq!(agreed.default_route(), Route::ENCRYPTED_REQUIRED);
    }

    #[test]
    fn mismatched_required_routes_are_refused() {
        let high = RoutingTable::server(SecurityLevel::High);
        assert!(high.accept(RoutingTable::client(SecurityLevel::Low)).is_none());

        let plain_only = RoutingTable::new(Route::PLAIN_OPTIONAL);
        assert!(
            plain_only
                .accept(RoutingTable::client(SecurityLevel::High))
                .is_none()
        );
    }

    #[test]
    fn security_level_parses_case_insensitively() {
        assert_eq!("HIGH".parse::<SecurityLevel>(), Ok(SecurityLevel::High));
        assert!("paranoid".parse::<SecurityLevel>().is_err());
        assert_eq!(SecurityLevel::default().to_string(), "normal");
    }
}
