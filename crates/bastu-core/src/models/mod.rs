//! Data models for the club's backend tables.
//!
//! This module contains the data structures used to represent
//! backend rows and derived view values:
//!
//! - `Member`, `CategorizedMember`, `Category`: the member directory
//! - `AccessEvent`: RFID and mobile-key door events
//! - `SmsGroup`, `SmsMessage`: SMS recipient groups and the message log
//! - `LeaderboardEntry`, `MemberBadge`: the badges leaderboard
//! - `ChatMessage`: AI chat console turns

pub mod access_event;
pub mod badges;
pub mod category;
pub mod chat;
pub mod member;
pub mod sms;

pub use access_event::{AccessEvent, AccessSource};
pub use badges::{LeaderboardEntry, LeaderboardRequest, MemberBadge};
pub use category::{Category, CategoryCounts};
pub use chat::{ChatMessage, Role};
pub use member::{CategorizedMember, Member, MemberRelation, VisitPeriod, VisitStats};
pub use sms::{Direction, GroupKind, SendReport, SmsGroup, SmsMessage};
