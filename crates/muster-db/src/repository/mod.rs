//! SurrealDB repository implementations.

mod audit;
mod member;

pub use audit::SurrealAuditEventRepository;
pub use member::SurrealMemberRepository;
