use anyhow::Result;

use tinysteps_core::service::TrackerService;

pub(crate) fn cmd_name(tracker: &mut TrackerService, name: Option<&str>, json: bool) -> Result<()> {
    if let Some(name) = name {
        tracker.set_baby_name(name)?;
    }

    let current = tracker.baby_name();
    if json {
        println!("{}", serde_json::json!({ "baby_name": current }));
    } else if current.is_empty() {
        println!("No name set. Use: tinysteps name <NAME>");
    } else if name.is_some() {
        println!("Baby name set to {current}");
    } else {
        println!("{current}");
    }
    Ok(())
}
