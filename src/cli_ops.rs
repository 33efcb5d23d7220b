use clap::{Args, Subcommand};

#[derive(Debug, Args)]
#[command(
    about = "Edge commands.",
    long_about = "Add or remove an edge from an item to an item of a related schema."
)]
pub struct EdgeArgs {
    #[command(subcommand)]
    pub command: EdgeSubcommands,
}

#[derive(Debug, Subcommand)]
pub enum EdgeSubcommands {
    #[command(about = "Add an edge: source -> target.")]
    Add(EdgeRefArgs),
    #[command(about = "Remove an edge: source -> target.")]
    Rm(EdgeRefArgs),
}

#[derive(Debug, Args)]
pub struct EdgeRefArgs {
    #[arg(help = "Source schema id.")]
    pub schema: String,

    #[arg(help = "Source item id.")]
    pub item: String,

    #[arg(help = "Target schema id.")]
    pub target_schema: String,

    #[arg(help = "Target item id.")]
    pub target_item: String,
}

#[derive(Debug, Args)]
pub struct TaskArgs {
    #[command(subcommand)]
    pub command: TaskSubcommands,
}

#[derive(Debug, Subcommand)]
pub enum TaskSubcommands {
    #[command(about = "Create a task.")]
    New(TaskNewArgs),
    #[command(about = "Show one task.")]
    Show(TaskRefArgs),
    #[command(about = "List tasks created by or assigned to a user.")]
    Ls(TaskListArgs),
    #[command(about = "Mark a task finished (or open again with --undo).")]
    Done(TaskDoneArgs),
    #[command(about = "Delete a task.")]
    Rm(TaskRefArgs),
    #[command(about = "Drop a user's tasks in an environment.")]
    Revoke(TaskRevokeArgs),
    #[command(about = "Delete every task that references a workspace, app or item.")]
    Purge(TaskPurgeArgs),
}

#[derive(Debug, Args)]
pub struct TaskNewArgs {
    #[arg(help = "Task text.")]
    pub information: String,

    #[arg(short = 'e', long, help = "Environment id.")]
    pub env: String,

    #[arg(short = 'a', long, help = "Assigned user (defaults to the acting user).")]
    pub assign: Option<String>,

    #[arg(short = 'w', long, help = "Workspace id.")]
    pub workspace: Option<String>,

    #[arg(long, help = "App (schema) id; needs --workspace.")]
    pub app: Option<String>,

    #[arg(long, help = "Item id; needs --app.")]
    pub item: Option<String>,

    #[arg(long, help = "Due date as Unix seconds.")]
    pub due: Option<i64>,

    #[arg(long, help = "Create the task already finished.")]
    pub finished: bool,

    #[arg(long, help = "Print JSON output.")]
    pub json: bool,
}

#[derive(Debug, Args)]
pub struct TaskRefArgs {
    #[arg(help = "Task id.")]
    pub id: String,

    #[arg(long, help = "Print JSON output.")]
    pub json: bool,
}

#[derive(Debug, Args)]
pub struct TaskListArgs {
    #[arg(long = "for", help = "User whose tasks to list (defaults to the acting user).")]
    pub for_user: Option<String>,

    #[arg(short = 'e', long, help = "Only tasks in this environment.")]
    pub env: Option<String>,

    #[arg(long, help = "Print JSON output.")]
    pub json: bool,
}

#[derive(Debug, Args)]
pub struct TaskDoneArgs {
    #[arg(help = "Task id.")]
    pub id: String,

    #[arg(long, help = "Mark the task open again.")]
    pub undo: bool,

    #[arg(long, help = "Print JSON output.")]
    pub json: bool,
}

#[derive(Debug, Args)]
pub struct TaskRevokeArgs {
    #[arg(help = "User leaving the environment.")]
    pub user_id: String,

    #[arg(short = 'e', long, help = "Environment id.")]
    pub env: String,
}

#[derive(Debug, Args)]
#[command(group(
    clap::ArgGroup::new("scope")
        .required(true)
        .args(["workspace", "app", "item"])
))]
pub struct TaskPurgeArgs {
    #[arg(short = 'w', long, help = "Workspace id.")]
    pub workspace: Option<String>,

    #[arg(long, help = "App (schema) id.")]
    pub app: Option<String>,

    #[arg(long, help = "Item id.")]
    pub item: Option<String>,

    #[arg(long, help = "Only list the tasks that would be deleted.")]
    pub dry_run: bool,
}

#[derive(Debug, Args)]
pub struct WorkspaceArgs {
    #[command(subcommand)]
    pub command: WorkspaceSubcommands,
}

#[derive(Debug, Subcommand)]
pub enum WorkspaceSubcommands {
    #[command(about = "Delete every schema, item and task of a workspace.")]
    Purge(WorkspacePurgeArgs),
}

#[derive(Debug, Args)]
pub struct WorkspacePurgeArgs {
    #[arg(help = "Workspace id.")]
    pub id: String,

    #[arg(long, help = "Print JSON output.")]
    pub json: bool,
}

#[derive(Debug, Args)]
pub struct LogArgs {
    #[command(subcommand)]
    pub command: LogSubcommands,
}

#[derive(Debug, Subcommand)]
pub enum LogSubcommands {
    #[command(about = "Append a note to an item's activity.")]
    Add(LogAddArgs),
    #[command(about = "List an item's activity, oldest first.")]
    Ls(LogListArgs),
}

#[derive(Debug, Args)]
pub struct LogAddArgs {
    #[arg(help = "Schema id.")]
    pub schema: String,

    #[arg(help = "Item id.")]
    pub item: String,

    #[arg(help = "Note text.")]
    pub text: String,

    #[arg(long, help = "Print JSON output.")]
    pub json: bool,
}

#[derive(Debug, Args)]
pub struct LogListArgs {
    #[arg(help = "Schema id.")]
    pub schema: String,

    #[arg(help = "Item id.")]
    pub item: String,

    #[arg(long, help = "Print JSON output.")]
    pub json: bool,
}

#[derive(Debug, Args)]
pub struct FsckArgs {
    #[arg(long, help = "Repair what can be repaired.")]
    pub repair: bool,

    #[arg(long, help = "Print JSON output.")]
    pub json: bool,
}

#[derive(Debug, Args)]
pub struct SeedArgs {
    #[arg(short = 'w', long, default_value = "W-sample", help = "Workspace to seed.")]
    pub workspace: String,

    #[arg(long, help = "Print JSON output.")]
    pub json: bool,
}
