// Spreadsheet extraction, validation and loading for the drumstats store.

pub mod cell;
pub mod grid;
pub mod identity;
pub mod kpi;
pub mod loader;
pub mod pipeline;
pub mod positions;
pub mod roster;
pub mod sheet;
pub mod validation;
pub mod workbook;

pub use pipeline::{open_workbook, CancelFlag, EtlPipeline};
pub use workbook::{Sheet, Workbook};
