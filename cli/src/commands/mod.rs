mod dashboard;
mod export;
mod helpers;
mod history;
mod insights;
mod log;
mod profile;
mod sync;
mod types;

pub(crate) use dashboard::{DashboardOptions, cmd_dashboard};
pub(crate) use export::{ExportFormat, cmd_export};
pub(crate) use history::cmd_history;
pub(crate) use insights::cmd_insights;
pub(crate) use log::{cmd_delete, cmd_log};
pub(crate) use profile::cmd_name;
pub(crate) use sync::{
    cmd_sync_key_generate, cmd_sync_key_set, cmd_sync_key_show, cmd_sync_now, cmd_sync_pull,
    cmd_sync_push,
};
pub(crate) use types::{TypeArgs, cmd_types_add, cmd_types_list, cmd_types_remove, print_palettes};
