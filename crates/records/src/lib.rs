//! Caller-facing record operations: manual entry and leave, device
//! authentication, and the per-user attendance report.

pub mod device;
pub mod entry;
pub mod report;

pub use device::DeviceAuthService;
pub use entry::{ManualEntry, ManualEntryRequest, ManualEntryService};
pub use report::AttendanceReportService;
