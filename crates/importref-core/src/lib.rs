//! core kinds, query model and identity records for importref.

pub mod kind;
pub mod pending;
pub mod query;
pub mod records;

pub use kind::{resolution_order, EntityKind, Id, KindParseError};
pub use pending::{
    uuids, HostPrototypeRef, HostPrototypeRefs, HostScopedNames, HostScopedRefs, HttpStepRefs,
    NameSet, NamedRefs, Pending, Registrations, TriggerRefs, UuidRef,
};
pub use query::{flags, Condition, Query, Row, Rows};
pub use records::{
    decode_rows, id_format, GraphRecord, GroupRecord, HostPrototypeRecord, HostRecord,
    HttpStepRecord, HttpTestRecord, ItemRecord, MacroRecord, NamedRecord, ProxyRecord, RowError,
    TemplateDashboardRecord, TemplateRecord, TriggerRecord, ValuemapRecord,
};
