//! Shared result-code vocabulary.
//!
//! One enumeration is used by this core and by every collaborator that
//! builds on the async-call primitive, so a failure always reads the same
//! regardless of which subsystem produced it.

use std::fmt;

macro_rules! result_codes {
    ($( $(#[$doc:meta])* $name:ident = $value:literal, )*) => {
        /// Result code reported by operations and async completions.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        #[repr(i32)]
        pub enum ResultCode {
            $( $(#[$doc])* $name = $value, )*
        }

        impl ResultCode {
            /// Every declared code, in numeric order.
            pub const ALL: &'static [ResultCode] = &[ $( ResultCode::$name, )* ];

            /// Parse a numeric code.
            pub fn from_code(code: i32) -> Option<Self> {
                match code {
                    $( $value => Some(Self::$name), )*
                    _ => None,
                }
            }

            /// Symbolic name of the code.
            pub fn name(self) -> &'static str {
                match self {
                    $( Self::$name => stringify!($name), )*
                }
            }
        }
    };
}

result_codes! {
    /// Success.
    Ok = 1,
    /// Generic failure.
    Fail = 2,
    /// No connection, or the connection has ended.
    NoConnection = 3,
    /// Password or ticket is invalid.
    InvalidPassword = 5,
    /// Same identity logged in elsewhere.
    LoggedInElsewhere = 6,
    /// Protocol version is incorrect.
    InvalidProtocolVersion = 7,
    /// A parameter is incorrect or a handle is invalid.
    InvalidParam = 8,
    /// File was not found.
    FileNotFound = 9,
    /// Called method is busy; no action taken.
    Busy = 10,
    /// Object is in a state that does not allow the operation.
    InvalidState = 11,
    /// Name is invalid.
    InvalidName = 12,
    /// Email is invalid.
    InvalidEmail = 13,
    /// Name is not unique.
    DuplicateName = 14,
    /// Access is denied.
    AccessDenied = 15,
    /// Operation timed out.
    Timeout = 16,
    /// Identity is banned.
    Banned = 17,
    /// Account not found.
    AccountNotFound = 18,
    /// Peer identity is invalid.
    InvalidPeerId = 19,
    /// Requested service is unavailable.
    ServiceUnavailable = 20,
    /// Caller is not logged on.
    NotLoggedOn = 21,
    /// Request is in progress.
    Pending = 22,
    /// Encryption or decryption failed.
    EncryptionFailure = 23,
    /// Insufficient privilege.
    InsufficientPrivilege = 24,
    /// Too much of a good thing: a quota or buffer limit was hit.
    LimitExceeded = 25,
    /// Access has been revoked.
    Revoked = 26,
    /// Licence or guest pass has expired.
    Expired = 27,
    /// Key has already been redeemed.
    AlreadyRedeemed = 28,
    /// Request is a duplicate and was ignored.
    DuplicateRequest = 29,
    /// Item is already owned.
    AlreadyOwned = 30,
    /// IP address not found.
    IpNotFound = 31,
    /// Failed to write a change to storage.
    PersistFailed = 32,
    /// Failed to acquire an access lock.
    LockingFailed = 33,
    /// Logon session was replaced.
    LogonSessionReplaced = 34,
    /// Failed to connect.
    ConnectFailed = 35,
    /// Authentication handshake failed.
    HandshakeFailed = 36,
    /// Generic I/O failure.
    IoFailure = 37,
    /// Remote server has disconnected.
    RemoteDisconnect = 38,
    /// Requested cart was not found.
    CartNotFound = 39,
    /// A user blocked the action.
    Blocked = 40,
    /// Target is ignoring the sender, or the request was dropped.
    Ignored = 41,
    /// Nothing could be found matching the request.
    NoMatch = 42,
    /// Account is disabled.
    AccountDisabled = 43,
    /// Service is read-only.
    ServiceReadOnly = 44,
    /// Account is not featured.
    AccountNotFeatured = 45,
    /// Allowed only because the caller is an administrator.
    AdministratorOk = 46,
    /// Content version mismatch.
    ContentVersion = 47,
    /// Connected server is going down; try another.
    TryAnotherServer = 48,
    /// Password required to kick the other session.
    PasswordRequiredToKickSession = 49,
    /// Already logged in elsewhere; must wait.
    AlreadyLoggedInElsewhere = 50,
    /// Operation is suspended.
    Suspended = 51,
    /// Operation was cancelled.
    Cancelled = 52,
    /// Data was corrupted.
    DataCorruption = 53,
    /// Disk is full.
    DiskFull = 54,
    /// A remote call or IPC call failed.
    RemoteCallFailed = 55,
    /// Password has not been set.
    PasswordUnset = 56,
    /// External account is not linked.
    ExternalAccountUnlinked = 57,
    /// External ticket is invalid.
    ExternalTicketInvalid = 58,
    /// External account is already linked.
    ExternalAccountAlreadyLinked = 59,
    /// Remote file conflict.
    RemoteFileConflict = 60,
    /// Password is not acceptable.
    IllegalPassword = 61,
    /// New value is the same as the previous value.
    SameAsPreviousValue = 62,
    /// Logon was denied.
    AccountLogonDenied = 63,
    /// Old password cannot be reused.
    CannotUseOldPassword = 64,
    /// Login auth code is invalid.
    InvalidLoginAuthCode = 65,
    /// Logon denied; no mail was sent.
    AccountLogonDeniedNoMail = 66,
    /// Hardware is not capable of identity protection.
    HardwareNotCapableOfIpt = 67,
    /// Identity protection initialisation failed.
    IptInitError = 68,
    /// Restricted by parental controls.
    ParentalControlRestricted = 69,
    /// External query failed.
    ExternalQueryError = 70,
    /// Login auth code has expired.
    ExpiredLoginAuthCode = 71,
    /// IP login restriction failed.
    IpLoginRestrictionFailed = 72,
    /// Account is locked down.
    AccountLockedDown = 73,
    /// Logon denied until email is verified.
    AccountLogonDeniedVerifiedEmailRequired = 74,
    /// No URL matched.
    NoMatchingUrl = 75,
    /// Response was malformed.
    BadResponse = 76,
    /// Password must be re-entered.
    RequirePasswordReEntry = 77,
    /// Value is out of range.
    ValueOutOfRange = 78,
    /// Something happened that was not expected.
    UnexpectedError = 79,
    /// Feature is disabled.
    Disabled = 80,
    /// Submission is invalid.
    InvalidCegSubmission = 81,
    /// Device is restricted.
    RestrictedDevice = 82,
    /// Region is locked.
    RegionLocked = 83,
    /// Rate limit exceeded; retry later.
    RateLimitExceeded = 84,
    /// Two-factor code required.
    AccountLoginDeniedNeedTwoFactor = 85,
    /// Item was deleted.
    ItemDeleted = 86,
    /// Logon attempts are throttled.
    AccountLoginDeniedThrottle = 87,
    /// Two-factor code mismatch.
    TwoFactorCodeMismatch = 88,
    /// Two-factor activation code mismatch.
    TwoFactorActivationCodeMismatch = 89,
    /// Account is associated with multiple partners.
    AccountAssociatedToMultiplePartners = 90,
    /// Data was not modified.
    NotModified = 91,
    /// No mobile device is registered.
    NoMobileDevice = 92,
    /// Clock is not synchronised.
    TimeNotSynced = 93,
    /// SMS code failed.
    SmsCodeFailed = 94,
    /// Account limit exceeded.
    AccountLimitExceeded = 95,
    /// Account activity limit exceeded.
    AccountActivityLimitExceeded = 96,
    /// Phone activity limit exceeded.
    PhoneActivityLimitExceeded = 97,
    /// Refund goes to wallet.
    RefundToWallet = 98,
    /// Email could not be sent.
    EmailSendFailure = 99,
    /// Payment has not settled.
    NotSettled = 100,
    /// Captcha is required.
    NeedCaptcha = 101,
    /// Server token was denied.
    ServerTokenDenied = 102,
    /// Server owner was denied.
    ServerOwnerDenied = 103,
    /// Item type is invalid.
    InvalidItemType = 104,
    /// IP address is banned.
    IpBanned = 105,
    /// Server token has expired.
    ServerTokenExpired = 106,
    /// Insufficient funds.
    InsufficientFunds = 107,
    /// Too many requests are pending.
    TooManyPending = 108,
    /// No site licences were found.
    NoSiteLicensesFound = 109,
    /// Network send quota exceeded.
    NetworkSendExceeded = 110,
    /// Accounts are not friends.
    AccountNotFriends = 111,
    /// Account is limited.
    LimitedUserAccount = 112,
    /// Item cannot be removed.
    CantRemoveItem = 113,
    /// Account was deleted.
    AccountDeleted = 114,
    /// Existing user cancelled the licence.
    ExistingUserCancelledLicense = 115,
    /// Community action is cooling down.
    CommunityCooldown = 116,
    /// No launcher was specified.
    NoLauncherSpecified = 117,
    /// Agreement must be accepted.
    MustAgreeToAgreement = 118,
    /// Launcher has migrated.
    LauncherMigrated = 119,
    /// Realm mismatch.
    RealmMismatch = 120,
    /// Signature is invalid.
    InvalidSignature = 121,
    /// Data failed to parse.
    ParseFailure = 122,
    /// No verified phone.
    NoVerifiedPhone = 123,
    /// Battery is too low.
    InsufficientBattery = 124,
    /// Charger is required.
    ChargerRequired = 125,
    /// Cached credential is invalid.
    CachedCredentialInvalid = 126,
    /// Phone number is VoIP.
    PhoneNumberIsVoip = 127,
    /// Operation is not supported.
    NotSupported = 128,
    /// Family size limit exceeded.
    FamilySizeLimitExceeded = 129,
    /// Offline cache is invalid.
    OfflineAppCacheInvalid = 130,
}

impl ResultCode {
    /// Numeric value of the code.
    pub fn code(self) -> i32 {
        self as i32
    }

    /// Whether the code reports success.
    pub fn is_ok(self) -> bool {
        self == ResultCode::Ok
    }
}

impl fmt::Display for ResultCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name(), self.code())
    }
}
