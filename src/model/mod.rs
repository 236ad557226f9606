//! Domain types shared by the stores and the HTTP boundary.

pub mod audit;
pub mod operation;
pub mod user;

pub use audit::{
    AuditAction, AuditEntry, AuditRecord, ClientContext, MAX_ENTITY_ID_LEN, MAX_IP_ADDRESS_LEN,
    MAX_USER_AGENT_LEN,
};
pub use operation::{
    Balances, BucketBalance, CashPointBalance, Direction, Entry, Metadata, OperationDraft,
    OperationRecord, OperationStatus, SectionTotals, Totals,
};
pub use user::{CredentialState, LockoutPolicy, NewUser, Role, User, UserProfile, UserSummary};
