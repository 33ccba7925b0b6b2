use anyhow::Result;
use tabled::{Table, Tabled, settings::Style};

use tinysteps_core::models::{
    ActivityCategory, COLOR_CHOICES, ICON_CHOICES, NewActivityType, is_default_type,
};
use tinysteps_core::service::TrackerService;

use super::helpers::now_ms;

pub(crate) fn cmd_types_list(tracker: &TrackerService, json: bool) -> Result<()> {
    #[derive(Tabled)]
    struct TypeRow {
        #[tabled(rename = "ID")]
        id: String,
        #[tabled(rename = "Name")]
        name: String,
        #[tabled(rename = "Category")]
        category: String,
        #[tabled(rename = "Unit")]
        unit: String,
        #[tabled(rename = "Icon")]
        icon: String,
        #[tabled(rename = "Default")]
        default: String,
    }

    if json {
        println!("{}", serde_json::to_string_pretty(tracker.types())?);
        return Ok(());
    }

    let rows: Vec<TypeRow> = tracker
        .types()
        .iter()
        .map(|t| TypeRow {
            id: t.id.clone(),
            name: t.name.clone(),
            category: t.category.to_string(),
            unit: t.unit.clone().unwrap_or_default(),
            icon: t.icon.clone(),
            default: if is_default_type(&t.id) { "yes" } else { "" }.to_string(),
        })
        .collect();

    println!("{}", Table::new(&rows).with(Style::rounded()));
    Ok(())
}

pub(crate) struct TypeArgs {
    pub name: String,
    pub category: String,
    pub icon: Option<String>,
    pub color: Option<String>,
    pub unit: Option<String>,
}

pub(crate) fn cmd_types_add(tracker: &mut TrackerService, args: TypeArgs, json: bool) -> Result<()> {
    let category: ActivityCategory = args.category.parse()?;
    let new_type = NewActivityType {
        name: args.name,
        category,
        icon: args.icon.unwrap_or_else(|| ICON_CHOICES[0].to_string()),
        color: args.color.unwrap_or_else(|| COLOR_CHOICES[0].to_string()),
        unit: args.unit,
    };
    let added = tracker.add_type(new_type, now_ms())?;

    if json {
        println!("{}", serde_json::to_string_pretty(&added)?);
    } else {
        let unit = added
            .unit
            .as_deref()
            .map(|u| format!(", unit {u}"))
            .unwrap_or_default();
        println!(
            "Added activity '{}' ({}{unit}) with id {}",
            added.name, added.category, added.id
        );
    }
    Ok(())
}

pub(crate) fn cmd_types_remove(tracker: &mut TrackerService, query: &str, json: bool) -> Result<()> {
    let id = tracker.resolve_type(query)?.id.clone();
    let removed = tracker.remove_type(&id)?;
    let orphaned = tracker
        .entries()
        .iter()
        .filter(|e| e.type_id == removed.id)
        .count();

    if json {
        println!(
            "{}",
            serde_json::json!({ "removed": removed, "orphaned_entries": orphaned })
        );
    } else {
        println!("Removed activity '{}'", removed.name);
        if orphaned > 0 {
            eprintln!("Note: {orphaned} logged entries keep referring to it and will show as Unknown");
        }
    }
    Ok(())
}

pub(crate) fn print_palettes() {
    println!("Icons:  {}", ICON_CHOICES.join(", "));
    println!("Colors: {}", COLOR_CHOICES.join(" | "));
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bath() -> TypeArgs {
        TypeArgs {
            name: "Bath Time".to_string(),
            category: "other".to_string(),
            icon: Some("fa-shower".to_string()),
            color: None,
            unit: Some("min".to_string()),
        }
    }

    #[test]
    fn test_add_then_remove_by_name() {
        let mut tracker = TrackerService::open_in_memory().unwrap();
        cmd_types_add(&mut tracker, bath(), true).unwrap();
        let added = tracker.types().last().unwrap().clone();
        assert!(added.id.starts_with("bath_time_"));
        assert_eq!(added.color, COLOR_CHOICES[0]);

        cmd_types_remove(&mut tracker, "bath time", true).unwrap();
        assert!(tracker.find_type(&added.id).is_none());
    }

    #[test]
    fn test_add_rejects_bad_category_and_icon() {
        let mut tracker = TrackerService::open_in_memory().unwrap();
        let mut args = bath();
        args.category = "play".to_string();
        assert!(cmd_types_add(&mut tracker, args, true).is_err());

        let mut args = bath();
        args.icon = Some("fa-rocket".to_string());
        assert!(cmd_types_add(&mut tracker, args, true).is_err());
    }

    #[test]
    fn test_remove_default_rejected() {
        let mut tracker = TrackerService::open_in_memory().unwrap();
        let err = cmd_types_remove(&mut tracker, "Pee", true).unwrap_err();
        assert!(err.to_string().contains("Cannot remove default"));
    }
}
