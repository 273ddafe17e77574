//! Wire command identifiers and the fixed ranges they are drawn from.
//!
//! Numbering is shared with the dispatcher and must not change. Each range is
//! inclusive on both ends.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Integer identifying one wire operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CommandId(pub u32);

/// Inclusive range of command identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CommandRange {
    /// First identifier in the range.
    pub start: CommandId,
    /// Last identifier in the range.
    pub end: CommandId,
}

impl CommandRange {
    /// Client to VM process.
    pub const CLIENT_TO_VM: Self = Self::new(1000, 1999);
    /// Client to dispatcher.
    pub const CLIENT_TO_DISPATCHER: Self = Self::new(2000, 2999);
    /// VM process to client.
    pub const VM_TO_CLIENT: Self = Self::new(3000, 3999);
    /// Dispatcher-internal control.
    pub const DISPATCHER_CONTROL: Self = Self::new(4000, 4999);
    /// Dispatcher to client (webservice replies).
    pub const WEBSERVICE: Self = Self::new(5000, 5999);
    /// Dispatcher to dispatcher (migration).
    pub const DISPATCHER_TO_DISPATCHER: Self = Self::new(6000, 7000);

    /// The six command ranges in ascending order.
    pub const ALL: [Self; 6] = [
        Self::CLIENT_TO_VM,
        Self::CLIENT_TO_DISPATCHER,
        Self::VM_TO_CLIENT,
        Self::DISPATCHER_CONTROL,
        Self::WEBSERVICE,
        Self::DISPATCHER_TO_DISPATCHER,
    ];

    /// Creates a range from raw bounds.
    pub const fn new(start: u32, end: u32) -> Self {
        Self {
            start: CommandId(start),
            end: CommandId(end),
        }
    }

    /// Range holding the single identifier `id`.
    pub const fn point(id: CommandId) -> Self {
        Self { start: id, end: id }
    }

    /// Returns `true` if the range holds exactly one identifier.
    pub const fn is_point(self) -> bool {
        self.start.0 == self.end.0
    }

    /// Returns `true` if `id` lies within the range.
    pub const fn contains(self, id: CommandId) -> bool {
        self.start.0 <= id.0 && id.0 <= self.end.0
    }

    /// Returns `true` if the two ranges share at least one identifier.
    pub const fn overlaps(self, other: Self) -> bool {
        self.start.0 <= other.end.0 && other.start.0 <= self.end.0
    }
}

impl fmt::Display for CommandRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_point() {
            write!(f, "{}", self.start)
        } else {
            write!(f, "{}..={}", self.start.0, self.end.0)
        }
    }
}

impl CommandId {
    /// Returns the declared range containing this identifier, if any.
    pub fn range(self) -> Option<CommandRange> {
        CommandRange::ALL.into_iter().find(|r| r.contains(self))
    }
}

impl From<u32> for CommandId {
    fn from(v: u32) -> Self {
        Self(v)
    }
}

impl fmt::Display for CommandId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => write!(f, "{name}({})", self.0),
            None => write!(f, "{}", self.0),
        }
    }
}

/// Declares the named command constants along with name lookups.
macro_rules! commands {
    ($( $(#[$meta:meta])* $name:ident = $value:literal, )*) => {
        impl CommandId {
            $(
                #[doc = concat!("`", stringify!($name), "` (", stringify!($value), ").")]
                $(#[$meta])*
                pub const $name: Self = Self($value);
            )*

            /// Every named command in declaration order.
            pub const NAMED: &'static [Self] = &[$(Self::$name),*];

            /// Constant name of a known command.
            pub const fn name(self) -> Option<&'static str> {
                match self.0 {
                    $($value => Some(stringify!($name)),)*
                    _ => None,
                }
            }

            /// Looks up a command by its constant name, e.g. `"VM_START"`.
            pub fn from_name(name: &str) -> Option<Self> {
                match name {
                    $(stringify!($name) => Some(Self::$name),)*
                    _ => None,
                }
            }
        }
    };
}

commands! {
    /// Placeholder carried by malformed or unmapped packages.
    ILLEGAL = 0,

    // Client to VM.
    VM_START = 1001,
    VM_STOP = 1002,
    VM_SET_CONFIG = 1003,
    VM_GET_CONFIG = 1004,
    VM_GET_PROBLEM_REPORT = 1005,
    VM_RESET = 1006,
    VM_PAUSE = 1007,
    VM_SUSPEND = 1008,
    VM_RESUME = 1009,
    VM_DROP_SUSPENDED_STATE = 1010,
    VM_CREATE_SNAPSHOT = 1011,
    VM_SWITCH_TO_SNAPSHOT = 1012,
    VM_GET_STATE = 1013,
    VM_DEV_CONNECT = 1014,
    VM_DEV_GET_STATE = 1015,
    VM_DEV_DISCONNECT = 1016,
    VM_DEV_CHANGE_MEDIA = 1017,
    VM_TASK_RUN = 1018,
    VM_TASK_GET_STATE = 1019,
    VM_TASK_CANCEL = 1020,
    VM_ANSWER = 1021,
    VM_GET_LOG_DATA = 1022,
    VM_GET_MONITOR_STATE = 1023,
    VM_INITIATE_DEV_STATE_NOTIFICATIONS = 1024,
    VM_INSTALL_TOOLS = 1025,
    VM_CANCEL_COMPACT = 1026,
    VM_GUEST_LOGOUT = 1027,
    VM_GUEST_RUN_PROGRAM = 1028,
    VM_GET_SUSPENDED_SCREEN = 1029,
    VM_MIGRATE_CANCEL = 1030,
    VM_RUN_COMPRESSOR = 1031,
    VM_CANCEL_COMPRESSOR = 1032,
    VM_FINISH_COMPRESSOR_INTERNAL = 1033,
    VM_DELETE_SNAPSHOT = 1034,
    VM_GET_SNAPSHOTS_TREE = 1035,
    VM_START_EX = 1036,
    VM_LOGIN_IN_GUEST = 1037,
    VM_UPDATE_SNAPSHOT_DATA = 1038,
    VM_RESTART_GUEST = 1039,
    VM_INSTALL_UTILITY = 1040,
    VM_UPDATE_TOOLS_SECTION = 1041,
    VM_START_VNC_SERVER = 1042,
    VM_STOP_VNC_SERVER = 1043,
    VM_GUEST_GET_NETWORK_SETTINGS = 1044,
    VM_AUTH_WITH_GUEST_SECURITY_DB = 1045,
    VM_GUEST_SET_USER_PASSWD = 1046,
    VM_CREATE_DISK_SNAPSHOT = 1047,
    VM_GUEST_CHANGE_SID = 1048,
    VM_COMPACT = 1049,
    VM_SUSPEND_CANCEL = 1050,
    VM_CHANGE_LOG_LEVEL = 1051,
    VM_GUEST_SUSPEND_HARD_DISK = 1052,
    VM_GUEST_RESUME_HARD_DISK = 1053,
    VM_GET_PACKED_PROBLEM_REPORT = 1054,
    VM_CHANGE_SID = 1055,
    VM_RESET_UPTIME = 1056,
    VM_INTERNAL = 1057,
    VM_CONVERT_DISKS = 1058,
    VM_MIGRATE_FINISH = 1059,
    PREPARE_FOR_HIBERNATE = 1115,
    AFTER_HOST_RESUME = 1116,

    // Client to dispatcher.
    DIR_VM_CREATE = 2023,
    DIR_VM_DELETE = 2024,
    DIR_VM_CLONE = 2025,
    DIR_VM_EDIT_BEGIN = 2026,
    DIR_VM_EDIT_COMMIT = 2027,
    DIR_VM_MIGRATE = 2028,
    DIR_GET_VM_LIST = 2029,
    DIR_GET_VM_CONFIG = 2030,
    DIR_SET_VM_CONFIG = 2031,
    DIR_CREATE_IMAGE = 2032,
    DIR_REG_VM = 2033,
    DIR_UNREG_VM = 2034,
    DIR_LOCK_VM = 2035,
    DIR_UNLOCK_VM = 2036,
    DIR_VERIFY_VM_CONFIG = 2037,
    START_SEARCH_CONFIG = 2038,
    USER_LOGIN = 2039,
    USER_LOGIN_LOCAL = 2040,
    USER_LOGIN_LOCAL_STAGE2 = 2041,
    USER_LOGOFF = 2042,
    USER_ATTACH_EVENT_NOTIFICATION = 2043,
    USER_GET_EVENT = 2044,
    USER_GET_PROFILE = 2045,
    USER_PROFILE_BEGIN_EDIT = 2046,
    USER_PROFILE_COMMIT = 2047,
    GET_HOST_COMMON_INFO = 2048,
    HOST_COMMON_INFO_BEGIN_EDIT = 2049,
    HOST_COMMON_INFO_COMMIT = 2050,
    USER_GET_HOST_HW_INFO = 2051,
    USER_PING = 2052,
    USER_CANCEL_OPERATION = 2053,
    FS_GET_DISK_LIST = 2054,
    FS_GET_CURRENT_DIRECTORY = 2055,
    FS_GET_DIRECTORY_ENTRIES = 2056,
    FS_GET_FILE_LIST = 2057,
    FS_CREATE_DIRECTORY = 2058,
    FS_RENAME_ENTRY = 2059,
    FS_REMOVE_ENTRY = 2060,
    DIR_INSTALL_GUEST_OS = 2061,
    GET_VM_INFO = 2062,
    SMC_GET_DISPATCHER_RT_INFO = 2063,
    SMC_GET_COMMAND_HISTORY_BY_VM = 2064,
    SMC_GET_COMMAND_HISTORY_BY_USER = 2065,
    SMC_SHUTDOWN_DISPATCHER = 2066,
    SMC_RESTART_DISPATCHER = 2068,
    SMC_DISCONNECT_USER = 2069,
    SMC_DISCONNECT_ALL_USERS = 2070,
    SMC_CANCEL_USER_COMMAND = 2071,
    SMC_SHUTDOWN_VM = 2072,
    SMC_RESTART_VM = 2073,
    SMC_SHUTDOWN_DISPATCHER_INTERNAL = 2074,
    NET_PRL_NETWORK_SERVICE_START = 2075,
    NET_PRL_NETWORK_SERVICE_STOP = 2076,
    NET_PRL_NETWORK_SERVICE_RESTART = 2077,
    GET_HOST_STATISTICS = 2078,
    VM_GET_STATISTICS = 2079,
    USER_UPDATE_LICENSE = 2080,
    USER_GET_LICENSE_INFO = 2081,
    VM_CREATE_UNATTENDED_FLOPPY = 2082,
    FS_CAN_CREATE_FILE = 2083,
    SUBSCRIBE_TO_HOST_STATISTICS = 2084,
    UNSUBSCRIBE_FROM_HOST_STATISTICS = 2085,
    VM_SUBSCRIBE_TO_GUEST_STATISTICS = 2086,
    VM_UNSUBSCRIBE_FROM_GUEST_STATISTICS = 2087,
    CONVERT_OLD_HDD = 2088,
    UPDATE_DEVICE_INFO = 2089,
    ATTACH_TO_LOST_TASK = 2090,
    GET_NET_SERVICE_STATUS = 2091,
    NET_PRL_NETWORK_SERVICE_RESTORE_DEFAULTS = 2092,
    ADD_NET_ADAPTER = 2093,
    DELETE_NET_ADAPTER = 2094,
    UPDATE_NET_ADAPTER = 2095,
    FILE_TRANSFER_LOGIN = 2096,
    FILE_TRANSFER_LOGIN_RESPONSE = 2097,
    FILE_TRANSFER_UPLOAD = 2098,
    FILE_TRANSFER_UPLOAD_RESPONSE = 2099,
    GET_VM_TOOLS_INFO = 2100,
    FS_GENERATE_ENTRY_NAME = 2101,
    LOOKUP_PARALLELS_SERVERS = 2102,
    VM_UPDATE_SECURITY = 2103,
    VM_SECTION_VALIDATE_CONFIG = 2104,
    USER_INFO_LIST = 2105,
    USER_INFO = 2106,
    PERFORMANCE_STATISTICS = 2107,
    ALL_HOST_USERS = 2108,
    DIR_RESTORE_VM = 2109,
    GET_VIRTUAL_NETWORK_LIST = 2110,
    ADD_VIRTUAL_NETWORK = 2111,
    UPDATE_VIRTUAL_NETWORK = 2112,
    DELETE_VIRTUAL_NETWORK = 2113,
    CONFIGURE_GENERIC_PCI = 2114,
    GET_BACKUP_TREE = 2117,
    CREATE_VM_BACKUP = 2118,
    RESTORE_VM_BACKUP = 2119,
    REMOVE_VM_BACKUP = 2120,
    SEND_PROBLEM_REPORT = 2122,
    VM_LOCK = 2123,
    VM_UNLOCK = 2124,
    SET_NON_INTERACTIVE_SESSION = 2125,
    CREATE_UNATTENDED_CD = 2126,
    CTL_CREATE_VM_BACKUP = 2127,
    VM_RESIZE_DISK = 2128,
    SET_SESSION_CONFIRMATION_MODE = 2129,
    STORAGE_SET_VALUE = 2130,
    VM_STORAGE_SET_VALUE = 2131,
    SEND_CLIENT_STATISTICS = 2132,
    UPDATE_USB_ASSOC_LIST = 2133,
    DIR_REG_3RD_PARTY_VM = 2134,
    INSTALL_APPLIANCE = 2135,
    UPDATE_OFFLINE_SERVICE = 2136,
    DELETE_OFFLINE_SERVICE = 2137,
    GET_OFFLINE_SERVICES_LIST = 2138,
    START_CLUSTER_SERVICE = 2139,
    STOP_CLUSTER_SERVICE = 2140,
    GET_VM_VIRT_DEV_INFO = 2141,
    VM_DEV_HD_CHECK_PASSWORD = 2142,
    VM_AUTHORISE = 2143,
    VM_CHANGE_PASSWORD = 2144,
    VM_ENCRYPT = 2145,
    VM_DECRYPT = 2146,
    UPDATE_NETWORK_CLASSES_CONFIG = 2147,
    GET_NETWORK_CLASSES_CONFIG = 2148,
    UPDATE_NETWORK_SHAPING_CONFIG = 2149,
    GET_NETWORK_SHAPING_CONFIG = 2150,
    RESTART_NETWORK_SHAPING = 2151,
    REGISTER_ISCSI_STORAGE = 2152,
    UNREGISTER_ISCSI_STORAGE = 2153,
    EXTEND_ISCSI_STORAGE = 2154,
    GET_CT_TEMPLATE_LIST = 2155,
    GET_DEFAULT_VM_CONFIG = 2156,
    REMOVE_CT_TEMPLATE = 2157,
    COPY_CT_TEMPLATE = 2158,
    CREATE_VM_BACKUP_LOCAL = 2159,
    ADD_IP_PRIVATE_NETWORK = 2160,
    REMOVE_IP_PRIVATE_NETWORK = 2161,
    UPDATE_IP_PRIVATE_NETWORK = 2162,
    GET_IP_PRIVATE_NETWORKS_LIST = 2163,
    DIR_COPY_IMAGE = 2164,
    REFRESH_PLUGINS = 2165,
    VM_MOUNT = 2166,
    VM_UMOUNT = 2167,
    VM_MOUNT_INFO = 2168,
    GET_PLUGINS_LIST = 2169,
    GET_DISK_FREE_SPACE = 2170,
    DIR_VM_MOVE = 2171,
    DIR_VM_MIGRATE_CLONE = 2172,
    GET_VM_CONFIG_BY_ID = 2173,
    DIR_VM_CLONE_LINKED = 2174,
    UPDATE_SESSION_INFO = 2175,
    VM_SET_PROTECTION = 2176,
    VM_REMOVE_PROTECTION = 2177,
    GET_CPU_POOLS_LIST = 2178,
    MOVE_TO_CPU_POOL = 2179,
    RECALCULATE_CPU_POOL = 2180,

    // VM to client.
    VM_REQUEST = 3001,
    VM_RESPONSE = 3002,
    VM_EVENT = 3003,
    VM_EVENT_START_VNC_SERVER = 3004,
    VM_EVENT_STOP_VNC_SERVER = 3005,
    VM_BINARY_EVENT = 3008,
    VM_BINARY_RESPONSE = 3009,
    VM_ANSWER_NOTIFY = 3010,
    VM_GET_HOST_HW_INFO = 3011,
    VM_RET_HOST_HW_INFO = 3012,
    VM_SEND_ECHO_EVENT = 3013,
    EVT_NOTIFY_VM = 3014,
    EVT_HW_CHANGED = 3020,
    VM_AUTH = 3021,
    VM_GET_HARD_DISK_STATES = 3022,
    VM_RET_HARD_DISK_STATES = 3023,
    VM_DEV_CONNECT_NOTIFY = 3024,
    VM_DEV_DISCONNECT_NOTIFY = 3025,
    EVT_NETWORK_PREF_CHANGED = 3026,
    VM_RESTORE_STATE = 3027,
    VM_STATE_INFO = 3028,

    // Dispatcher control.
    CTL_GET_STATUS = 4001,
    CTL_PROCESS_DEFERRED_TASK_FINISH = 4002,
    CTL_DEFERRED_DELETE_DSP_OBJECT = 4003,
    CTL_APPLY_VM_CONFIG = 4004,
    CTL_VM_EDIT_WITH_RENAME = 4005,
    CTL_VM_EDIT_WITH_HARDWARE_CHANGED = 4006,
    CTL_VM_EDIT_BOOTCAMP_RECONFIGURE = 4007,
    CTL_VM_EDIT_ADAPTER_IP_CHANGED = 4008,
    CTL_VM_STAND_BY_GUEST = 4009,
    CTL_VM_EDIT_FIREWALL = 4010,
    CTL_UPDATE_SHADOW_VM = 4011,
    CTL_LICENSE_CHANGE = 4012,
    CTL_MIGRATE_TARGET = 4013,
    CTL_START_MIGRATED_VM = 4014,
    CTL_VM_COMMIT_DISK_UNFINISHED = 4015,
    CTL_VM_COLLECT_GUEST_USAGE = 4016,

    // Dispatcher to client (webservice).
    WS_RESPONSE = 5001,
    REPLY_WS_STATUS = 5002,
    WS_BINARY_RESPONSE = 5003,

    // IO channel package types. These sit outside every command range.
    /// Keyboard scancodes sent to the VM display.
    IO_CLI_KEYBOARD_SCANCODE = 10001,
    /// Clipboard contents sent from the client.
    IO_CLI_TOOLS_CLIPBOARD_DATA = 10002,
    /// Session authentication request.
    IO_CLI_AUTHENTICATE_SESSION = 10003,
    /// Request to attach an IO client to a running VM.
    IO_CLI_ATTACH_TO_VM = 10004,
    /// Exec-session authentication request, see [`crate::AuthRequest`].
    IO_CLI_AUTHENTICATE_EXEC_SESSION = 10005,
    /// Authentication verdict, see [`crate::AuthResponse`].
    IO_AUTH_RESPONSE = 10006,
    /// Captured VM screen buffer.
    IO_SCREEN_CAPTURED_BUFFER = 10007,
    /// Clipboard contents sent by guest tools.
    IO_TOOLS_CLIPBOARD_DATA = 10008,
    /// Guest tools reporting VM shutdown.
    IO_TOOLS_VM_SHUTDOWN = 10009,
    /// Portion of a guest program's stdin.
    IO_STDIN_PORTION = 10010,
    /// Portion of a guest program's stdout.
    IO_STDOUT_PORTION = 10011,
    /// Portion of a guest program's stderr.
    IO_STDERR_PORTION = 10012,
}
