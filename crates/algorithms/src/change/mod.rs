//! Land-cover change analysis
//!
//! - **matrix**: from/to transition encoding, transition masks, forest loss,
//!   transition areas and tables
//! - **report**: change report assembly and hotspot intensity

mod matrix;
mod report;

pub use matrix::{
    build_matrix, class_mask, forest_loss, is_set, transition_areas, transition_code, transition_mask,
    transition_table, TransitionTable, MAX_CLASS_CODE, TRANSITION_BAND,
};
pub use report::{
    assemble_change_report, percent_change, ChangeReport, ChangeReportAssembler, ClassAreaChange, ClassEntry,
    KeyTransitions, ReportConfig, ReportSummary,
};
