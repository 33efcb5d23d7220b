use std::path::PathBuf;

use clap::builder::styling::{AnsiColor, Effects, Styles};
use clap::{Args, Parser, Subcommand};

pub use crate::cli_ops::*;

fn cli_styles() -> Styles {
    Styles::styled()
        .header(AnsiColor::BrightCyan.on_default() | Effects::BOLD)
        .usage(AnsiColor::BrightYellow.on_default() | Effects::BOLD)
        .literal(AnsiColor::BrightGreen.on_default() | Effects::BOLD)
        .placeholder(AnsiColor::BrightMagenta.on_default())
}

#[derive(Debug, Parser)]
#[command(name = "schemata")]
#[command(bin_name = "schemata")]
#[command(version)]
#[command(about = "Dynamic schemas, related items and tasks in one SQLite store")]
#[command(styles = cli_styles())]
pub struct Cli {
    #[arg(
        short = 'd',
        long,
        global = true,
        env = "SCHEMATA_DB_PATH",
        default_value = ".schemata/store.sqlite",
        help = "Path to the SQLite store."
    )]
    pub db: String,

    #[arg(
        short = 'c',
        long,
        global = true,
        env = "SCHEMATA_CONFIG",
        default_value = crate::config::DEFAULT_CONFIG_PATH,
        help = "Path to the TOML configuration file."
    )]
    pub config: PathBuf,

    #[arg(
        short = 'u',
        long,
        global = true,
        env = "SCHEMATA_USER",
        default_value = "local",
        help = "User the command acts on behalf of."
    )]
    pub user: String,

    #[arg(long, global = true, help = "Emit logs as JSON lines on stderr.")]
    pub log_json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    #[command(about = "Define and inspect schemas.")]
    Schema(SchemaArgs),
    #[command(about = "Create, read and delete items.")]
    Item(ItemArgs),
    #[command(about = "Add or remove relation edges between items.")]
    Edge(EdgeArgs),
    #[command(about = "Manage tasks attached to workspaces, apps and items.")]
    Task(TaskArgs),
    #[command(about = "Workspace-wide operations.")]
    Workspace(WorkspaceArgs),
    #[command(about = "Read or append item activity.")]
    Log(LogArgs),
    #[command(about = "Check store consistency and optionally repair it.")]
    Fsck(FsckArgs),
    #[command(about = "Populate a workspace with sample Clients and Invoices.")]
    Seed(SeedArgs),
}

#[derive(Debug, Args)]
pub struct SchemaArgs {
    #[command(subcommand)]
    pub command: SchemaSubcommands,
}

#[derive(Debug, Subcommand)]
pub enum SchemaSubcommands {
    #[command(about = "Define a new schema.")]
    New(SchemaNewArgs),
    #[command(about = "Show one schema.")]
    Show(SchemaShowArgs),
    #[command(about = "List schemas.")]
    Ls(SchemaListArgs),
    #[command(about = "Rename a schema.")]
    Rename(SchemaRenameArgs),
    #[command(about = "Replace a schema definition.")]
    Update(SchemaUpdateArgs),
    #[command(about = "Delete a schema with all of its items.")]
    Rm(SchemaShowArgs),
}

#[derive(Debug, Args, Clone, Default)]
pub struct SchemaDefinitionArgs {
    #[arg(
        short = 'f',
        long = "field",
        value_name = "NAME:TYPE",
        help = "Field definition (repeatable), e.g. 'Total:decimal'."
    )]
    pub fields: Vec<String>,

    #[arg(
        short = 'r',
        long = "relation",
        value_name = "NAME=SCHEMA_ID",
        help = "Relation field (repeatable), e.g. 'Client=S-...'."
    )]
    pub relations: Vec<String>,

    #[arg(short = 'i', long, help = "Icon id.")]
    pub icon: Option<String>,
}

#[derive(Debug, Args)]
pub struct SchemaNewArgs {
    #[arg(help = "Schema name.")]
    pub name: String,

    #[arg(short = 'w', long, help = "Owning workspace id.")]
    pub workspace: String,

    #[command(flatten)]
    pub definition: SchemaDefinitionArgs,

    #[arg(long, help = "Print the created schema as JSON.")]
    pub json: bool,
}

#[derive(Debug, Args)]
pub struct SchemaShowArgs {
    #[arg(help = "Schema id.")]
    pub id: String,

    #[arg(long, help = "Print JSON output.")]
    pub json: bool,
}

#[derive(Debug, Args)]
pub struct SchemaListArgs {
    #[arg(short = 'w', long, help = "Only schemas of this workspace.")]
    pub workspace: Option<String>,

    #[arg(long, help = "Print JSON output.")]
    pub json: bool,
}

#[derive(Debug, Args)]
pub struct SchemaRenameArgs {
    #[arg(help = "Schema id.")]
    pub id: String,

    #[arg(help = "New name.")]
    pub name: String,

    #[arg(long, help = "Print JSON output.")]
    pub json: bool,
}

#[derive(Debug, Args)]
pub struct SchemaUpdateArgs {
    #[arg(help = "Schema id.")]
    pub id: String,

    #[arg(short = 'n', long, help = "New name (defaults to the current one).")]
    pub name: Option<String>,

    #[command(flatten)]
    pub definition: SchemaDefinitionArgs,

    #[arg(long, help = "Print JSON output.")]
    pub json: bool,
}

#[derive(Debug, Args)]
pub struct ItemArgs {
    #[command(subcommand)]
    pub command: ItemSubcommands,
}

#[derive(Debug, Subcommand)]
pub enum ItemSubcommands {
    #[command(about = "Create an item.")]
    New(ItemNewArgs),
    #[command(about = "Show one item.")]
    Show(ItemRefArgs),
    #[command(about = "List every item of a schema.")]
    Ls(ItemListArgs),
    #[command(about = "Show one page of items.")]
    Page(ItemPageArgs),
    #[command(about = "Find items by descriptive name.")]
    Find(ItemFindArgs),
    #[command(about = "Update an item.")]
    Update(ItemUpdateArgs),
    #[command(about = "Delete an item.")]
    Rm(ItemRefArgs),
    #[command(about = "Delete several items of one schema.")]
    BulkRm(ItemBulkRemoveArgs),
}

#[derive(Debug, Args, Clone, Default)]
pub struct ItemValueArgs {
    #[arg(
        short = 's',
        long = "set",
        value_name = "FIELD=VALUE",
        help = "Field value (repeatable). JSON literals are parsed, anything else is text."
    )]
    pub set: Vec<String>,

    #[arg(
        short = 'l',
        long = "link",
        value_name = "RELATION=ITEM_ID",
        help = "Relation target (repeatable)."
    )]
    pub link: Vec<String>,
}

#[derive(Debug, Args)]
pub struct ItemNewArgs {
    #[arg(help = "Schema id.")]
    pub schema: String,

    #[arg(help = "Descriptive name.")]
    pub name: String,

    #[command(flatten)]
    pub values: ItemValueArgs,

    #[arg(long, help = "Print JSON output.")]
    pub json: bool,
}

#[derive(Debug, Args)]
pub struct ItemRefArgs {
    #[arg(help = "Schema id.")]
    pub schema: String,

    #[arg(help = "Item id.")]
    pub id: String,

    #[arg(long, help = "Print JSON output.")]
    pub json: bool,
}

#[derive(Debug, Args)]
pub struct ItemListArgs {
    #[arg(help = "Schema id.")]
    pub schema: String,

    #[arg(long, help = "Print JSON output.")]
    pub json: bool,
}

#[derive(Debug, Args)]
pub struct ItemPageArgs {
    #[arg(help = "Schema id.")]
    pub schema: String,

    #[arg(short = 'o', long, default_value_t = 0, help = "Number of items to skip.")]
    pub offset: u32,

    #[arg(long, help = "Sort by id descending.")]
    pub desc: bool,

    #[arg(long, help = "Print JSON output.")]
    pub json: bool,
}

#[derive(Debug, Args)]
pub struct ItemFindArgs {
    #[arg(help = "Schema id.")]
    pub schema: String,

    #[arg(help = "Substring of the descriptive name.")]
    pub needle: String,

    #[arg(short = 'i', long, help = "Match case-insensitively.")]
    pub ignore_case: bool,

    #[arg(long, help = "Print JSON output.")]
    pub json: bool,
}

#[derive(Debug, Args)]
pub struct ItemUpdateArgs {
    #[arg(help = "Schema id.")]
    pub schema: String,

    #[arg(help = "Item id.")]
    pub id: String,

    #[arg(short = 'n', long, help = "New descriptive name.")]
    pub name: Option<String>,

    #[command(flatten)]
    pub values: ItemValueArgs,

    #[arg(
        long,
        help = "Fail unless the stored item still has this version."
    )]
    pub if_match: Option<i64>,

    #[arg(long, help = "Print JSON output.")]
    pub json: bool,
}

#[derive(Debug, Args)]
pub struct ItemBulkRemoveArgs {
    #[arg(help = "Schema id.")]
    pub schema: String,

    #[arg(required = true, help = "Item ids.")]
    pub ids: Vec<String>,

    #[arg(long, help = "Print JSON output.")]
    pub json: bool,
}

#[cfg(test)]
#[path = "cli_tests.rs"]
mod tests;
