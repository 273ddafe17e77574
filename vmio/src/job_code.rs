//! Job operation codes and their mapping to dispatcher commands.
//!
//! The forward table maps a dispatcher command to the job operation it
//! starts. The reverse table is its inversion plus a handful of aliases:
//! several job codes share one command, so for those codes the round trip
//! through [`to_command`] and [`to_job_code`] lands on a different code.

use std::collections::HashMap;
use std::fmt;
use std::sync::OnceLock;

use vmio_proto::CommandId;

/// Generates [`JobCode`] numbered from zero in declaration order, with its
/// name table.
macro_rules! job_codes {
    ($($variant:ident => $name:literal,)*) => {
        /// Operation a job performs.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        #[repr(u32)]
        #[non_exhaustive]
        pub enum JobCode {
            $(
                #[doc = concat!("`", $name, "`.")]
                $variant,
            )*
        }

        impl JobCode {
            /// Every code, indexed by its numeric value.
            pub const ALL: &'static [Self] = &[$(Self::$variant),*];

            /// Canonical upper-case name.
            pub const fn name(self) -> &'static str {
                match self {
                    $(Self::$variant => $name,)*
                }
            }
        }
    };
}

job_codes! {
    Unknown => "UNKNOWN",
    JobCancel => "JOB_CANCEL",
    SrvLookupParallelsServers => "SRV_LOOKUP_PARALLELS_SERVERS",
    SrvLogin => "SRV_LOGIN",
    SrvLoginLocal => "SRV_LOGIN_LOCAL",
    SrvLogoff => "SRV_LOGOFF",
    SrvSetNonInteractiveSession => "SRV_SET_NON_INTERACTIVE_SESSION",
    SrvSetSessionConfirmationMode => "SRV_SET_SESSION_CONFIRMATION_MODE",
    SrvGetSrvConfig => "SRV_GET_SRV_CONFIG",
    SrvGetCommonPrefs => "SRV_GET_COMMON_PREFS",
    SrvCommonPrefsBeginEdit => "SRV_COMMON_PREFS_BEGIN_EDIT",
    SrvCommonPrefsCommit => "SRV_COMMON_PREFS_COMMIT",
    SrvGetUserProfile => "SRV_GET_USER_PROFILE",
    SrvGetStatistics => "SRV_GET_STATISTICS",
    SrvUserProfileBeginEdit => "SRV_USER_PROFILE_BEGIN_EDIT",
    SrvUserProfileCommit => "SRV_USER_PROFILE_COMMIT",
    SrvRegisterVm => "SRV_REGISTER_VM",
    VmRestore => "VM_RESTORE",
    SrvGetVmList => "SRV_GET_VM_LIST",
    SrvSubscribeToHostStatistics => "SRV_SUBSCRIBE_TO_HOST_STATISTICS",
    SrvUnsubscribeFromHostStatistics => "SRV_UNSUBSCRIBE_FROM_HOST_STATISTICS",
    SrvShutdown => "SRV_SHUTDOWN",
    SrvFsGetDiskList => "SRV_FS_GET_DISK_LIST",
    SrvFsGetDirEntries => "SRV_FS_GET_DIR_ENTRIES",
    SrvFsCreateDir => "SRV_FS_CREATE_DIR",
    SrvFsRemoveEntry => "SRV_FS_REMOVE_ENTRY",
    SrvFsCanCreateFile => "SRV_FS_CAN_CREATE_FILE",
    SrvFsRenameEntry => "SRV_FS_RENAME_ENTRY",
    SrvFsGenerateEntryName => "SRV_FS_GENERATE_ENTRY_NAME",
    SrvUpdateLicense => "SRV_UPDATE_LICENSE",
    SrvGetLicenseInfo => "SRV_GET_LICENSE_INFO",
    SrvSendAnswer => "SRV_SEND_ANSWER",
    SrvStartSearchVms => "SRV_START_SEARCH_VMS",
    SrvNetServiceStart => "SRV_NET_SERVICE_START",
    SrvNetServiceStop => "SRV_NET_SERVICE_STOP",
    SrvNetServiceRestart => "SRV_NET_SERVICE_RESTART",
    SrvNetServiceRestoreDefaults => "SRV_NET_SERVICE_RESTORE_DEFAULTS",
    SrvGetNetServiceStatus => "SRV_GET_NET_SERVICE_STATUS",
    SrvAddNetAdapter => "SRV_ADD_NET_ADAPTER",
    SrvDeleteNetAdapter => "SRV_DELETE_NET_ADAPTER",
    SrvUpdateNetAdapter => "SRV_UPDATE_NET_ADAPTER",
    SrvGetProblemReport => "SRV_GET_PROBLEM_REPORT",
    SrvGetPackedProblemReport => "SRV_GET_PACKED_PROBLEM_REPORT",
    SrvAttachToLostTask => "SRV_ATTACH_TO_LOST_TASK",
    SrvGetUserInfoList => "SRV_GET_USER_INFO_LIST",
    SrvGetUserInfo => "SRV_GET_USER_INFO",
    SrvPrepareForHibernate => "SRV_PREPARE_FOR_HIBERNATE",
    SrvAfterHostResume => "SRV_AFTER_HOST_RESUME",
    SrvGetVirtualNetworkList => "SRV_GET_VIRTUAL_NETWORK_LIST",
    SrvAddVirtualNetwork => "SRV_ADD_VIRTUAL_NETWORK",
    SrvUpdateVirtualNetwork => "SRV_UPDATE_VIRTUAL_NETWORK",
    SrvDeleteVirtualNetwork => "SRV_DELETE_VIRTUAL_NETWORK",
    SrvConfigureGenericPci => "SRV_CONFIGURE_GENERIC_PCI",
    SrvGetAllHostUsers => "SRV_GET_ALL_HOST_USERS",
    VmStart => "VM_START",
    VmStartEx => "VM_START_EX",
    VmRestart => "VM_RESTART",
    VmStop => "VM_STOP",
    VmPause => "VM_PAUSE",
    VmReset => "VM_RESET",
    VmCmdInternal => "VM_CMD_INTERNAL",
    VmSuspend => "VM_SUSPEND",
    VmGetSuspendedScreen => "VM_GET_SUSPENDED_SCREEN",
    VmResume => "VM_RESUME",
    VmDropSuspendedState => "VM_DROP_SUSPENDED_STATE",
    VmClone => "VM_CLONE",
    VmDelete => "VM_DELETE",
    VmGetState => "VM_GET_STATE",
    VmGetToolsState => "VM_GET_TOOLS_STATE",
    VmRefreshConfig => "VM_REFRESH_CONFIG",
    VmGetStatistics => "VM_GET_STATISTICS",
    VmSubscribeToGuestStatistics => "VM_SUBSCRIBE_TO_GUEST_STATISTICS",
    VmUnsubscribeFromGuestStatistics => "VM_UNSUBSCRIBE_FROM_GUEST_STATISTICS",
    VmReg => "VM_REG",
    VmUnreg => "VM_UNREG",
    VmBeginEdit => "VM_BEGIN_EDIT",
    VmCommit => "VM_COMMIT",
    VmCreateUnattendedFloppy => "VM_CREATE_UNATTENDED_FLOPPY",
    VmInitiateDevStateNotifications => "VM_INITIATE_DEV_STATE_NOTIFICATIONS",
    VmUpdateSecurity => "VM_UPDATE_SECURITY",
    VmValidateConfig => "VM_VALIDATE_CONFIG",
    VmDevConnect => "VM_DEV_CONNECT",
    VmDevDisconnect => "VM_DEV_DISCONNECT",
    VmDevHdCheckPassword => "VM_DEV_HD_CHECK_PASSWORD",
    VmDevCreateImage => "VM_DEV_CREATE_IMAGE",
    VmDevCopyImage => "VM_DEV_COPY_IMAGE",
    VmResizeDiskImage => "VM_RESIZE_DISK_IMAGE",
    VmInstallUtility => "VM_INSTALL_UTILITY",
    VmInstallTools => "VM_INSTALL_TOOLS",
    VmRunCompressor => "VM_RUN_COMPRESSOR",
    VmCancelCompressor => "VM_CANCEL_COMPRESSOR",
    VmStartVncServer => "VM_START_VNC_SERVER",
    VmStopVncServer => "VM_STOP_VNC_SERVER",
    VmGuestGetNetworkSettings => "VM_GUEST_GET_NETWORK_SETTINGS",
    VmLoginInGuest => "VM_LOGIN_IN_GUEST",
    VmGuestRunProgram => "VM_GUEST_RUN_PROGRAM",
    VmGuestLogout => "VM_GUEST_LOGOUT",
    VmAuthWithGuestSecurityDb => "VM_AUTH_WITH_GUEST_SECURITY_DB",
    VmGuestSetUserPasswd => "VM_GUEST_SET_USER_PASSWD",
    SrvCreateVmBackup => "SRV_CREATE_VM_BACKUP",
    SrvRestoreVmBackup => "SRV_RESTORE_VM_BACKUP",
    SrvGetBackupTree => "SRV_GET_BACKUP_TREE",
    SrvRemoveVmBackup => "SRV_REMOVE_VM_BACKUP",
    VmLock => "VM_LOCK",
    VmUnlock => "VM_UNLOCK",
    SrvStoreValueByKey => "SRV_STORE_VALUE_BY_KEY",
    VmStoreValueByKey => "VM_STORE_VALUE_BY_KEY",
    VmCompact => "VM_COMPACT",
    VmConvertDisks => "VM_CONVERT_DISKS",
    VmCancelCompact => "VM_CANCEL_COMPACT",
    SrvRegister3rdPartyVm => "SRV_REGISTER_3RD_PARTY_VM",
    VmChangeSid => "VM_CHANGE_SID",
    VmResetUptime => "VM_RESET_UPTIME",
    SrvInstallAppliance => "SRV_INSTALL_APPLIANCE",
    SrvUpdateOfflineService => "SRV_UPDATE_OFFLINE_SERVICE",
    SrvDeleteOfflineService => "SRV_DELETE_OFFLINE_SERVICE",
    SrvGetOfflineServicesList => "SRV_GET_OFFLINE_SERVICES_LIST",
    VmAuthorise => "VM_AUTHORISE",
    VmChangePassword => "VM_CHANGE_PASSWORD",
    VmEncrypt => "VM_ENCRYPT",
    VmDecrypt => "VM_DECRYPT",
    SrvUpdateNetworkClassesConfig => "SRV_UPDATE_NETWORK_CLASSES_CONFIG",
    SrvGetNetworkClassesList => "SRV_GET_NETWORK_CLASSES_LIST",
    SrvUpdateNetworkShapingConfig => "SRV_UPDATE_NETWORK_SHAPING_CONFIG",
    SrvGetNetworkShapingConfig => "SRV_GET_NETWORK_SHAPING_CONFIG",
    SrvRestartNetworkShaping => "SRV_RESTART_NETWORK_SHAPING",
    SrvRegisterIscsiStorage => "SRV_REGISTER_ISCSI_STORAGE",
    SrvUnregisterIscsiStorage => "SRV_UNREGISTER_ISCSI_STORAGE",
    SrvExtendIscsiStorage => "SRV_EXTEND_ISCSI_STORAGE",
    SrvGetCtTemplateList => "SRV_GET_CT_TEMPLATE_LIST",
    SrvRemoveCtTemplate => "SRV_REMOVE_CT_TEMPLATE",
    SrvCopyCtTemplate => "SRV_COPY_CT_TEMPLATE",
    SrvAddIpprivateNetwork => "SRV_ADD_IPPRIVATE_NETWORK",
    SrvRemoveIpprivateNetwork => "SRV_REMOVE_IPPRIVATE_NETWORK",
    SrvUpdateIpprivateNetwork => "SRV_UPDATE_IPPRIVATE_NETWORK",
    SrvGetIpprivateNetworksList => "SRV_GET_IPPRIVATE_NETWORKS_LIST",
    VmMigrate => "VM_MIGRATE",
    VmMigrateCancel => "VM_MIGRATE_CANCEL",
    SrvRefreshPlugins => "SRV_REFRESH_PLUGINS",
    VmMount => "VM_MOUNT",
    VmUmount => "VM_UMOUNT",
    SrvGetPluginsList => "SRV_GET_PLUGINS_LIST",
    SrvGetDiskFreeSpace => "SRV_GET_DISK_FREE_SPACE",
    VmMove => "VM_MOVE",
    SrvGetVmConfig => "SRV_GET_VM_CONFIG",
    SrvSendProblemReport => "SRV_SEND_PROBLEM_REPORT",
    VmSetProtection => "VM_SET_PROTECTION",
    VmRemoveProtection => "VM_REMOVE_PROTECTION",
    SrvCpuPoolsListPools => "SRV_CPU_POOLS_LIST_POOLS",
    SrvCpuPoolsMove => "SRV_CPU_POOLS_MOVE",
    SrvCpuPoolsRecalculate => "SRV_CPU_POOLS_RECALCULATE",
    VmConnectToVm => "VM_CONNECT_TO_VM",
    VmGetProblemReport => "VM_GET_PROBLEM_REPORT",
    VmGetPackedProblemReport => "VM_GET_PACKED_PROBLEM_REPORT",
    VmGenerateVmDevFilename => "VM_GENERATE_VM_DEV_FILENAME",
    SrvSubscribePerfstats => "SRV_SUBSCRIBE_PERFSTATS",
    SrvUnsubscribePerfstats => "SRV_UNSUBSCRIBE_PERFSTATS",
    SrvGetPerfstats => "SRV_GET_PERFSTATS",
    VmSubscribePerfstats => "VM_SUBSCRIBE_PERFSTATS",
    VmUnsubscribePerfstats => "VM_UNSUBSCRIBE_PERFSTATS",
    VmGetPerfstats => "VM_GET_PERFSTATS",
}

impl JobCode {
    /// Numeric value.
    pub const fn as_u32(self) -> u32 {
        self as u32
    }

    /// Code with numeric value `value`.
    pub fn from_u32(value: u32) -> Option<Self> {
        usize::try_from(value)
            .ok()
            .and_then(|i| Self::ALL.get(i))
            .copied()
    }

    /// Looks a code up by its canonical name.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|c| c.name() == name)
    }
}

impl fmt::Display for JobCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Dispatcher command each job operation is started by.
const PAIRS: &[(CommandId, JobCode)] = &[
    (CommandId::USER_CANCEL_OPERATION, JobCode::JobCancel),
    (CommandId::LOOKUP_PARALLELS_SERVERS, JobCode::SrvLookupParallelsServers),
    (CommandId::USER_LOGIN, JobCode::SrvLogin),
    (CommandId::USER_LOGIN_LOCAL, JobCode::SrvLoginLocal),
    (CommandId::USER_LOGIN_LOCAL_STAGE2, JobCode::SrvLoginLocal),
    (CommandId::USER_LOGOFF, JobCode::SrvLogoff),
    (CommandId::SET_NON_INTERACTIVE_SESSION, JobCode::SrvSetNonInteractiveSession),
    (CommandId::SET_SESSION_CONFIRMATION_MODE, JobCode::SrvSetSessionConfirmationMode),
    (CommandId::USER_GET_HOST_HW_INFO, JobCode::SrvGetSrvConfig),
    (CommandId::GET_HOST_COMMON_INFO, JobCode::SrvGetCommonPrefs),
    (CommandId::HOST_COMMON_INFO_BEGIN_EDIT, JobCode::SrvCommonPrefsBeginEdit),
    (CommandId::HOST_COMMON_INFO_COMMIT, JobCode::SrvCommonPrefsCommit),
    (CommandId::USER_GET_PROFILE, JobCode::SrvGetUserProfile),
    (CommandId::GET_HOST_STATISTICS, JobCode::SrvGetStatistics),
    (CommandId::USER_PROFILE_BEGIN_EDIT, JobCode::SrvUserProfileBeginEdit),
    (CommandId::USER_PROFILE_COMMIT, JobCode::SrvUserProfileCommit),
    (CommandId::DIR_REG_VM, JobCode::SrvRegisterVm),
    (CommandId::DIR_RESTORE_VM, JobCode::VmRestore),
    (CommandId::DIR_GET_VM_LIST, JobCode::SrvGetVmList),
    (CommandId::SUBSCRIBE_TO_HOST_STATISTICS, JobCode::SrvSubscribeToHostStatistics),
    (CommandId::UNSUBSCRIBE_FROM_HOST_STATISTICS, JobCode::SrvUnsubscribeFromHostStatistics),
    (CommandId::SMC_SHUTDOWN_DISPATCHER, JobCode::SrvShutdown),
    (CommandId::FS_GET_DISK_LIST, JobCode::SrvFsGetDiskList),
    (CommandId::FS_GET_DIRECTORY_ENTRIES, JobCode::SrvFsGetDirEntries),
    (CommandId::FS_CREATE_DIRECTORY, JobCode::SrvFsCreateDir),
    (CommandId::FS_REMOVE_ENTRY, JobCode::SrvFsRemoveEntry),
    (CommandId::FS_CAN_CREATE_FILE, JobCode::SrvFsCanCreateFile),
    (CommandId::FS_RENAME_ENTRY, JobCode::SrvFsRenameEntry),
    (CommandId::FS_GENERATE_ENTRY_NAME, JobCode::SrvFsGenerateEntryName),
    (CommandId::USER_UPDATE_LICENSE, JobCode::SrvUpdateLicense),
    (CommandId::USER_GET_LICENSE_INFO, JobCode::SrvGetLicenseInfo),
    (CommandId::VM_ANSWER, JobCode::SrvSendAnswer),
    (CommandId::START_SEARCH_CONFIG, JobCode::SrvStartSearchVms),
    (CommandId::NET_PRL_NETWORK_SERVICE_START, JobCode::SrvNetServiceStart),
    (CommandId::NET_PRL_NETWORK_SERVICE_STOP, JobCode::SrvNetServiceStop),
    (CommandId::NET_PRL_NETWORK_SERVICE_RESTART, JobCode::SrvNetServiceRestart),
    (CommandId::NET_PRL_NETWORK_SERVICE_RESTORE_DEFAULTS, JobCode::SrvNetServiceRestoreDefaults),
    (CommandId::GET_NET_SERVICE_STATUS, JobCode::SrvGetNetServiceStatus),
    (CommandId::ADD_NET_ADAPTER, JobCode::SrvAddNetAdapter),
    (CommandId::DELETE_NET_ADAPTER, JobCode::SrvDeleteNetAdapter),
    (CommandId::UPDATE_NET_ADAPTER, JobCode::SrvUpdateNetAdapter),
    (CommandId::VM_GET_PROBLEM_REPORT, JobCode::SrvGetProblemReport),
    (CommandId::VM_GET_PACKED_PROBLEM_REPORT, JobCode::SrvGetPackedProblemReport),
    (CommandId::ATTACH_TO_LOST_TASK, JobCode::SrvAttachToLostTask),
    (CommandId::USER_INFO_LIST, JobCode::SrvGetUserInfoList),
    (CommandId::USER_INFO, JobCode::SrvGetUserInfo),
    (CommandId::PREPARE_FOR_HIBERNATE, JobCode::SrvPrepareForHibernate),
    (CommandId::AFTER_HOST_RESUME, JobCode::SrvAfterHostResume),
    (CommandId::GET_VIRTUAL_NETWORK_LIST, JobCode::SrvGetVirtualNetworkList),
    (CommandId::ADD_VIRTUAL_NETWORK, JobCode::SrvAddVirtualNetwork),
    (CommandId::UPDATE_VIRTUAL_NETWORK, JobCode::SrvUpdateVirtualNetwork),
    (CommandId::DELETE_VIRTUAL_NETWORK, JobCode::SrvDeleteVirtualNetwork),
    (CommandId::CONFIGURE_GENERIC_PCI, JobCode::SrvConfigureGenericPci),
    (CommandId::ALL_HOST_USERS, JobCode::SrvGetAllHostUsers),
    (CommandId::VM_START, JobCode::VmStart),
    (CommandId::VM_START_EX, JobCode::VmStartEx),
    (CommandId::VM_RESTART_GUEST, JobCode::VmRestart),
    (CommandId::VM_STOP, JobCode::VmStop),
    (CommandId::VM_PAUSE, JobCode::VmPause),
    (CommandId::VM_RESET, JobCode::VmReset),
    (CommandId::VM_INTERNAL, JobCode::VmCmdInternal),
    (CommandId::VM_SUSPEND, JobCode::VmSuspend),
    (CommandId::VM_GET_SUSPENDED_SCREEN, JobCode::VmGetSuspendedScreen),
    (CommandId::VM_RESUME, JobCode::VmResume),
    (CommandId::VM_DROP_SUSPENDED_STATE, JobCode::VmDropSuspendedState),
    (CommandId::DIR_VM_CLONE, JobCode::VmClone),
    (CommandId::DIR_VM_DELETE, JobCode::VmDelete),
    (CommandId::VM_GET_STATE, JobCode::VmGetState),
    (CommandId::GET_VM_TOOLS_INFO, JobCode::VmGetToolsState),
    (CommandId::VM_GET_CONFIG, JobCode::VmRefreshConfig),
    (CommandId::VM_GET_STATISTICS, JobCode::VmGetStatistics),
    (CommandId::VM_SUBSCRIBE_TO_GUEST_STATISTICS, JobCode::VmSubscribeToGuestStatistics),
    (CommandId::VM_UNSUBSCRIBE_FROM_GUEST_STATISTICS, JobCode::VmUnsubscribeFromGuestStatistics),
    (CommandId::DIR_VM_CREATE, JobCode::VmReg),
    (CommandId::DIR_UNREG_VM, JobCode::VmUnreg),
    (CommandId::DIR_VM_EDIT_BEGIN, JobCode::VmBeginEdit),
    (CommandId::DIR_VM_EDIT_COMMIT, JobCode::VmCommit),
    (CommandId::VM_CREATE_UNATTENDED_FLOPPY, JobCode::VmCreateUnattendedFloppy),
    (CommandId::VM_INITIATE_DEV_STATE_NOTIFICATIONS, JobCode::VmInitiateDevStateNotifications),
    (CommandId::VM_UPDATE_SECURITY, JobCode::VmUpdateSecurity),
    (CommandId::VM_SECTION_VALIDATE_CONFIG, JobCode::VmValidateConfig),
    (CommandId::VM_DEV_CONNECT, JobCode::VmDevConnect),
    (CommandId::VM_DEV_DISCONNECT, JobCode::VmDevDisconnect),
    (CommandId::VM_DEV_HD_CHECK_PASSWORD, JobCode::VmDevHdCheckPassword),
    (CommandId::DIR_CREATE_IMAGE, JobCode::VmDevCreateImage),
    (CommandId::DIR_COPY_IMAGE, JobCode::VmDevCopyImage),
    (CommandId::VM_RESIZE_DISK, JobCode::VmResizeDiskImage),
    (CommandId::VM_INSTALL_UTILITY, JobCode::VmInstallUtility),
    (CommandId::VM_INSTALL_TOOLS, JobCode::VmInstallTools),
    (CommandId::VM_RUN_COMPRESSOR, JobCode::VmRunCompressor),
    (CommandId::VM_CANCEL_COMPRESSOR, JobCode::VmCancelCompressor),
    (CommandId::VM_START_VNC_SERVER, JobCode::VmStartVncServer),
    (CommandId::VM_STOP_VNC_SERVER, JobCode::VmStopVncServer),
    (CommandId::VM_GUEST_GET_NETWORK_SETTINGS, JobCode::VmGuestGetNetworkSettings),
    (CommandId::VM_LOGIN_IN_GUEST, JobCode::VmLoginInGuest),
    (CommandId::VM_GUEST_RUN_PROGRAM, JobCode::VmGuestRunProgram),
    (CommandId::VM_GUEST_LOGOUT, JobCode::VmGuestLogout),
    (CommandId::VM_AUTH_WITH_GUEST_SECURITY_DB, JobCode::VmAuthWithGuestSecurityDb),
    (CommandId::VM_GUEST_SET_USER_PASSWD, JobCode::VmGuestSetUserPasswd),
    (CommandId::CREATE_VM_BACKUP, JobCode::SrvCreateVmBackup),
    (CommandId::RESTORE_VM_BACKUP, JobCode::SrvRestoreVmBackup),
    (CommandId::GET_BACKUP_TREE, JobCode::SrvGetBackupTree),
    (CommandId::REMOVE_VM_BACKUP, JobCode::SrvRemoveVmBackup),
    (CommandId::VM_LOCK, JobCode::VmLock),
    (CommandId::VM_UNLOCK, JobCode::VmUnlock),
    (CommandId::STORAGE_SET_VALUE, JobCode::SrvStoreValueByKey),
    (CommandId::VM_STORAGE_SET_VALUE, JobCode::VmStoreValueByKey),
    (CommandId::VM_COMPACT, JobCode::VmCompact),
    (CommandId::VM_CONVERT_DISKS, JobCode::VmConvertDisks),
    (CommandId::VM_CANCEL_COMPACT, JobCode::VmCancelCompact),
    (CommandId::DIR_REG_3RD_PARTY_VM, JobCode::SrvRegister3rdPartyVm),
    (CommandId::VM_CHANGE_SID, JobCode::VmChangeSid),
    (CommandId::VM_RESET_UPTIME, JobCode::VmResetUptime),
    (CommandId::INSTALL_APPLIANCE, JobCode::SrvInstallAppliance),
    (CommandId::UPDATE_OFFLINE_SERVICE, JobCode::SrvUpdateOfflineService),
    (CommandId::DELETE_OFFLINE_SERVICE, JobCode::SrvDeleteOfflineService),
    (CommandId::GET_OFFLINE_SERVICES_LIST, JobCode::SrvGetOfflineServicesList),
    (CommandId::VM_AUTHORISE, JobCode::VmAuthorise),
    (CommandId::VM_CHANGE_PASSWORD, JobCode::VmChangePassword),
    (CommandId::VM_ENCRYPT, JobCode::VmEncrypt),
    (CommandId::VM_DECRYPT, JobCode::VmDecrypt),
    (CommandId::UPDATE_NETWORK_CLASSES_CONFIG, JobCode::SrvUpdateNetworkClassesConfig),
    (CommandId::GET_NETWORK_CLASSES_CONFIG, JobCode::SrvGetNetworkClassesList),
    (CommandId::UPDATE_NETWORK_SHAPING_CONFIG, JobCode::SrvUpdateNetworkShapingConfig),
    (CommandId::GET_NETWORK_SHAPING_CONFIG, JobCode::SrvGetNetworkShapingConfig),
    (CommandId::RESTART_NETWORK_SHAPING, JobCode::SrvRestartNetworkShaping),
    (CommandId::REGISTER_ISCSI_STORAGE, JobCode::SrvRegisterIscsiStorage),
    (CommandId::UNREGISTER_ISCSI_STORAGE, JobCode::SrvUnregisterIscsiStorage),
    (CommandId::EXTEND_ISCSI_STORAGE, JobCode::SrvExtendIscsiStorage),
    (CommandId::GET_CT_TEMPLATE_LIST, JobCode::SrvGetCtTemplateList),
    (CommandId::REMOVE_CT_TEMPLATE, JobCode::SrvRemoveCtTemplate),
    (CommandId::COPY_CT_TEMPLATE, JobCode::SrvCopyCtTemplate),
    (CommandId::ADD_IP_PRIVATE_NETWORK, JobCode::SrvAddIpprivateNetwork),
    (CommandId::REMOVE_IP_PRIVATE_NETWORK, JobCode::SrvRemoveIpprivateNetwork),
    (CommandId::UPDATE_IP_PRIVATE_NETWORK, JobCode::SrvUpdateIpprivateNetwork),
    (CommandId::GET_IP_PRIVATE_NETWORKS_LIST, JobCode::SrvGetIpprivateNetworksList),
    (CommandId::DIR_VM_MIGRATE, JobCode::VmMigrate),
    (CommandId::VM_MIGRATE_CANCEL, JobCode::VmMigrateCancel),
    (CommandId::REFRESH_PLUGINS, JobCode::SrvRefreshPlugins),
    (CommandId::VM_MOUNT, JobCode::VmMount),
    (CommandId::VM_UMOUNT, JobCode::VmUmount),
    (CommandId::GET_PLUGINS_LIST, JobCode::SrvGetPluginsList),
    (CommandId::GET_DISK_FREE_SPACE, JobCode::SrvGetDiskFreeSpace),
    (CommandId::DIR_VM_MOVE, JobCode::VmMove),
    (CommandId::GET_VM_CONFIG_BY_ID, JobCode::SrvGetVmConfig),
    (CommandId::SEND_PROBLEM_REPORT, JobCode::SrvSendProblemReport),
    (CommandId::VM_SET_PROTECTION, JobCode::VmSetProtection),
    (CommandId::VM_REMOVE_PROTECTION, JobCode::VmRemoveProtection),
    (CommandId::GET_CPU_POOLS_LIST, JobCode::SrvCpuPoolsListPools),
    (CommandId::MOVE_TO_CPU_POOL, JobCode::SrvCpuPoolsMove),
    (CommandId::RECALCULATE_CPU_POOL, JobCode::SrvCpuPoolsRecalculate),
];

/// Reverse entries that override the inversion of [`PAIRS`].
const ALIASES: &[(JobCode, CommandId)] = &[
    (JobCode::VmGetProblemReport, CommandId::VM_GET_PROBLEM_REPORT),
    (JobCode::VmGetPackedProblemReport, CommandId::VM_GET_PACKED_PROBLEM_REPORT),
    (JobCode::SrvSendProblemReport, CommandId::SEND_PROBLEM_REPORT),
    (JobCode::VmGenerateVmDevFilename, CommandId::FS_GENERATE_ENTRY_NAME),
];

/// Performance-statistics codes, contiguous by value, all sent as one command.
const PERF_STATS: (JobCode, JobCode) = (JobCode::SrvSubscribePerfstats, JobCode::VmGetPerfstats);

/// Bidirectional command / job-code lookup.
#[derive(Debug, Clone)]
pub struct CommandJobMap {
    /// Command to job code.
    forward: HashMap<CommandId, JobCode>,
    /// Job code to command.
    reverse: HashMap<JobCode, CommandId>,
}

impl CommandJobMap {
    /// Builds both tables.
    pub fn new() -> Self {
        let forward: HashMap<_, _> = PAIRS.iter().copied().collect();

        let mut reverse = HashMap::with_capacity(PAIRS.len() + ALIASES.len());
        for &(cmd, code) in PAIRS {
            reverse.entry(code).or_insert(cmd);
        }
        reverse.extend(ALIASES.iter().copied());
        let (first, last) = PERF_STATS;
        for value in first.as_u32()..=last.as_u32() {
            if let Some(code) = JobCode::from_u32(value) {
                reverse.insert(code, CommandId::PERFORMANCE_STATISTICS);
            }
        }

        Self { forward, reverse }
    }

    /// Process-wide instance, built on first use.
    pub fn global() -> &'static Self {
        static MAP: OnceLock<CommandJobMap> = OnceLock::new();
        MAP.get_or_init(Self::new)
    }

    /// Job code started by `cmd`, or [`JobCode::Unknown`].
    pub fn job_code(&self, cmd: CommandId) -> JobCode {
        self.forward.get(&cmd).copied().unwrap_or(JobCode::Unknown)
    }

    /// Command that starts `code`, or [`CommandId::ILLEGAL`].
    pub fn command(&self, code: JobCode) -> CommandId {
        self.reverse.get(&code).copied().unwrap_or(CommandId::ILLEGAL)
    }

    /// Forward pairs in table order.
    pub const fn pairs() -> &'static [(CommandId, JobCode)] {
        PAIRS
    }
}

impl Default for CommandJobMap {
    fn default() -> Self {
        Self::new()
    }
}

/// Job code started by `cmd`, using the global map.
pub fn to_job_code(cmd: CommandId) -> JobCode {
    CommandJobMap::global().job_code(cmd)
}

/// Command that starts `code`, using the global map.
pub fn to_command(code: JobCode) -> CommandId {
    CommandJobMap::global().command(code)
}
