//! Well-known object, class and attribute ids.
//!
//! These are opaque numbers assigned by the PLC object model. The client
//! only needs the handful below to set up a session and address variables;
//! any other id is passed through unchanged.

/// Placeholder for "no id".
pub const NONE: u32 = 0;

/// Root object of the PLC.
pub const OBJECT_ROOT: u32 = 201;
/// Asks the server to assign a new relation id.
pub const GET_NEW_RID_ON_SERVER: u32 = 211;
/// Class of the subscriptions container inside a session.
pub const CLASS_SUBSCRIPTIONS: u32 = 255;
/// Container holding all server sessions.
pub const OBJECT_SERVER_SESSION_CONTAINER: u32 = 285;
/// Class of a server session.
pub const CLASS_SERVER_SESSION: u32 = 287;
/// Session id used before a session exists.
pub const OBJECT_NULL_SERVER_SESSION: u32 = 288;

/// Relation id the client announces for itself.
pub const SERVER_SESSION_CLIENT_RID: u32 = 300;
/// Legitimation challenge of the session.
pub const SERVER_SESSION_REQUEST: u32 = 303;
/// Legitimation response of the session.
pub const SERVER_SESSION_RESPONSE: u32 = 304;
/// Negotiated server session version.
pub const SERVER_SESSION_VERSION: u32 = 306;

/// System limits of the PLC.
pub const SYSTEM_LIMITS: u32 = 1037;
/// Object qualifier appended to multi-variable requests.
pub const OBJECT_QUALIFIER: u32 = 1256;
/// Parent relation id inside an object qualifier.
pub const PARENT_RID: u32 = 1257;
/// Composition attribute id inside an object qualifier.
pub const COMPOSITION_AID: u32 = 1258;
/// Key qualifier inside an object qualifier.
pub const KEY_QUALIFIER: u32 = 1259;
/// Protection level currently granted to the session.
pub const EFFECTIVE_PROTECTION_LEVEL: u32 = 1842;

/// Actual values of a data block.
pub const DB_VALUE_ACTUAL: u32 = 2550;
/// Actual values of a controller memory area.
pub const CONTROLLER_AREA_VALUE_ACTUAL: u32 = 2551;

/// Process image inputs.
pub const NATIVE_OBJECTS_THE_I_AREA_RID: u32 = 80;
/// Process image outputs.
pub const NATIVE_OBJECTS_THE_Q_AREA_RID: u32 = 81;
/// Bit memory.
pub const NATIVE_OBJECTS_THE_M_AREA_RID: u32 = 82;
/// S7 timers.
pub const NATIVE_OBJECTS_THE_S7_TIMERS_RID: u32 = 83;
/// S7 counters.
pub const NATIVE_OBJECTS_THE_S7_COUNTERS_RID: u32 = 84;

/// Access area of data block 0; data block `n` is `DB_ACCESS_AREA_BASE + n`.
pub const DB_ACCESS_AREA_BASE: u32 = 0x8A0E_0000;

/// Relation id value the client sends as `ServerSessionClientRID`.
pub const CLIENT_RID: u32 = 0x80C3_C901;

/// System limit entries, addressed as LIDs below [`SYSTEM_LIMITS`].
pub mod limits {
    /// Maximum number of items in one read request.
    pub const TAGS_PER_READ_REQUEST_MAX: u32 = 1;
    /// Maximum number of items in one write request.
    pub const TAGS_PER_WRITE_REQUEST_MAX: u32 = 2;
    /// Maximum number of subscriptions.
    pub const PLC_SUBSCRIPTIONS_MAX: u32 = 3;
    /// Maximum number of attributes per subscription.
    pub const PLC_ATTRIBUTES_MAX: u32 = 4;
    /// Memory available for subscriptions.
    pub const SUBSCRIPTION_MEMORY_MAX: u32 = 5;
}

/// Protection levels reported by [`EFFECTIVE_PROTECTION_LEVEL`].
pub mod access_level {
    /// Full access, no password needed.
    pub const FULL_ACCESS: u32 = 1;
    /// Read access.
    pub const READ_ACCESS: u32 = 2;
    /// HMI access.
    pub const HMI_ACCESS: u32 = 3;
    /// No access.
    pub const NO_ACCESS: u32 = 4;
}
