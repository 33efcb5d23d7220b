use std::io::{self, IsTerminal};

use crate::db::ActivityEntry;
use crate::domain::item::Item;
use crate::domain::schema::AppSchema;
use crate::domain::task::Task;
use crate::fsck::FsckReport;
use crate::ids::display_id;

pub fn stderr_is_terminal() -> bool {
    std::env::var_os("NO_COLOR").is_none() && io::stderr().is_terminal()
}

pub fn print_schema_list(schemas: &[AppSchema]) {
    let palette = Palette::auto();
    println!("{}", palette.heading("Schemas"));
    if schemas.is_empty() {
        println!("{}", palette.dim("no schemas"));
        return;
    }
    for schema in schemas {
        println!(
            "{} {} {}",
            palette.id(&schema.id),
            schema.name,
            palette.dim(&format!(
                "[{}] {} field(s), {} relation(s), {} item(s)",
                schema.workspace_id,
                schema.fields.len(),
                schema.relation_fields.len(),
                schema.item_ids.len()
            ))
        );
    }
    println!("{}", palette.dim(&format!("{} schema(s)", schemas.len())));
}

pub fn print_schema(schema: &AppSchema) {
    let palette = Palette::auto();
    println!("{} {}", palette.id(&schema.id), palette.heading(&schema.name));
    println!("{}", palette.dim(&format!("workspace: {}", schema.workspace_id)));
    if let Some(icon) = schema.icon_id.as_deref() {
        println!("{}", palette.dim(&format!("icon: {icon}")));
    }
    for field in &schema.fields {
        println!(
            "  {} {} {}",
            field.name,
            palette.field_type(field.field_type.as_str()),
            palette.dim(&field.derived_property_name)
        );
    }
    for relation in &schema.relation_fields {
        println!(
            "  {} {} {}",
            relation.name,
            palette.field_type("itemRelation"),
            palette.dim(&format!(
                "-> {} ({})",
                relation.related_schema_name, relation.related_schema_id
            ))
        );
    }
    println!("{}", palette.dim(&format!("{} item(s)", schema.item_ids.len())));
}

pub fn print_item_list(items: &[Item]) {
    let palette = Palette::auto();
    if items.is_empty() {
        println!("{}", palette.dim("no items matched"));
        return;
    }
    for item in items {
        println!(
            "{} {} {}",
            palette.id(display_id(&item.id)),
            item.descriptive_name,
            palette.dim(&format!("v{}", item.version))
        );
    }
    println!("{}", palette.dim(&format!("{} item(s)", items.len())));
}

pub fn print_item(item: &Item) {
    let palette = Palette::auto();
    println!(
        "{} {} {}",
        palette.id(&item.id),
        palette.heading(&item.descriptive_name),
        palette.dim(&format!("v{}", item.version))
    );
    for entry in &item.field_values {
        let rendered = if entry.value.is_empty() {
            palette.dim("-")
        } else {
            entry.value.to_string()
        };
        println!("  {}: {}", entry.name, rendered);
    }
    for relation in &item.relation_values {
        let targets = relation
            .edge
            .related_items
            .iter()
            .map(|related| format!("{} ({})", related.related_item_name, related.related_item_id))
            .collect::<Vec<_>>();
        println!(
            "  {} {} {}",
            relation.name,
            palette.dim("->"),
            if targets.is_empty() {
                palette.dim("-")
            } else {
                targets.join(", ")
            }
        );
    }
    for group in &item.relations {
        if group.related_items.is_empty() {
            continue;
        }
        let sources = group
            .related_items
            .iter()
            .map(|related| related.related_item_name.as_str())
            .collect::<Vec<_>>();
        println!(
            "  {} {} {}",
            palette.dim("<-"),
            group.related_schema_name,
            sources.join(", ")
        );
    }
}

pub fn print_task_list(tasks: &[Task]) {
    let palette = Palette::auto();
    println!("{}", palette.heading("Tasks"));
    if tasks.is_empty() {
        println!("{}", palette.dim("no tasks"));
        return;
    }
    for task in tasks {
        println!("{}", format_task_row(task, &palette));
    }
    println!("{}", palette.dim(&format!("{} task(s)", tasks.len())));
}

fn format_task_row(task: &Task, palette: &Palette) -> String {
    let mut line = format!(
        "{} {} {}",
        palette.id(display_id(&task.id)),
        palette.status(task.finished),
        task.information
    );
    line.push(' ');
    line.push_str(&palette.dim(&format!("@{}", task.assigned_user_id)));
    if let Some(scope) = task_scope_summary(task) {
        line.push(' ');
        line.push_str(&palette.dim(&scope));
    }
    line
}

fn task_scope_summary(task: &Task) -> Option<String> {
    let mut parts = vec![format!("env={}", task.environment_id)];
    if let Some(workspace) = task.workspace_id.as_deref() {
        parts.push(format!("workspace={workspace}"));
    }
    if let Some(app) = task.app_id.as_deref() {
        parts.push(format!("app={app}"));
    }
    if let Some(item) = task.item_id.as_deref() {
        parts.push(format!("item={item}"));
    }
    if let Some(due) = task.due_date {
        parts.push(format!("due={due}"));
    }
    if parts.len() == 1 && task.due_date.is_none() {
        return None;
    }
    Some(parts.join(" "))
}

pub fn print_activity(entries: &[ActivityEntry]) {
    let palette = Palette::auto();
    if entries.is_empty() {
        println!("{}", palette.dim("no activity"));
        return;
    }
    for entry in entries {
        println!(
            "{} {} {}",
            palette.dim(&entry.created_on.to_string()),
            palette.id(&entry.creator_id),
            entry.text
        );
    }
}

pub fn print_fsck_report(report: &FsckReport) {
    let palette = Palette::auto();
    if report.ok() {
        println!(
            "{} {}",
            palette.ok("fsck ok"),
            palette.dim(&format!(
                "schemas={} items={} repaired={}",
                report.schemas_scanned, report.items_scanned, report.repaired
            ))
        );
        return;
    }
    println!(
        "{} {}",
        palette.failure(&format!("fsck found {} issue(s)", report.issues.len())),
        palette.dim(&format!(
            "schemas={} items={} repaired={}",
            report.schemas_scanned, report.items_scanned, report.repaired
        ))
    );
    for issue in &report.issues {
        let marker = if issue.repairable { "" } else { " (manual)" };
        println!("- {}: {}{}", issue.path, issue.message, palette.dim(marker));
    }
}

struct Palette {
    enabled: bool,
}

impl Palette {
    fn auto() -> Self {
        let enabled = std::env::var_os("NO_COLOR").is_none() && io::stdout().is_terminal();
        Self { enabled }
    }

    fn paint(&self, code: &str, text: &str) -> String {
        if self.enabled {
            format!("\x1b[{code}m{text}\x1b[0m")
        } else {
            text.to_string()
        }
    }

    fn heading(&self, text: &str) -> String {
        self.paint("1;36", text)
    }

    fn dim(&self, text: &str) -> String {
        self.paint("2", text)
    }

    fn id(&self, text: &str) -> String {
        self.paint("1;94", text)
    }

    fn field_type(&self, field_type: &str) -> String {
        self.paint("35", &format!("({field_type})"))
    }

    fn status(&self, finished: bool) -> String {
        if finished {
            self.paint("32", "[DONE]")
        } else {
            self.paint("33", "[OPEN]")
        }
    }

    fn ok(&self, text: &str) -> String {
        self.paint("1;32", text)
    }

    fn failure(&self, text: &str) -> String {
        self.paint("1;31", text)
    }
}
