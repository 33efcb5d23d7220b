mod access;
mod cli;
mod cli_ops;
mod config;
mod db;
mod dispatch;
mod domain;
mod engine;
mod fsck;
mod ids;
mod logging;
#[cfg(test)]
mod main_tests;
mod retry;
mod seed;
mod ui;

use dispatch::CliError;

fn main() {
    if let Err(err) = run() {
        eprintln!("error: {}", err);
        std::process::exit(1);
    }
}

fn print_json(value: &impl serde::Serialize) -> Result<(), CliError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn run() -> Result<(), CliError> {
    use clap::Parser;
    use cli::{
        Commands, EdgeSubcommands, ItemSubcommands, LogSubcommands, SchemaSubcommands,
        TaskSubcommands, WorkspaceSubcommands,
    };

    let cli = cli::Cli::parse();
    logging::init(cli.log_json);
    let config = config::Config::load(&cli.config)?;
    let engine = engine::Engine::open(&cli.db, &config, &cli.user)?;

    match cli.command {
        Commands::Schema(args) => match args.command {
            SchemaSubcommands::New(args) => {
                let draft = dispatch::schema_draft(&args.name, &args.definition)?;
                let schema = engine.create_schema(&args.workspace, &draft)?;
                if args.json {
                    print_json(&schema)?;
                } else {
                    println!("created {} {}", schema.id, schema.name);
                }
            }
            SchemaSubcommands::Show(args) => {
                let schema = engine.get_schema(&args.id)?;
                if args.json {
                    print_json(&schema)?;
                } else {
                    ui::print_schema(&schema);
                }
            }
            SchemaSubcommands::Ls(args) => {
                let schemas = engine.list_schemas(args.workspace.as_deref())?;
                if args.json {
                    print_json(&schemas)?;
                } else {
                    ui::print_schema_list(&schemas);
                }
            }
            SchemaSubcommands::Rename(args) => {
                let schema = engine.rename_schema(&args.id, &args.name)?;
                if args.json {
                    print_json(&schema)?;
                } else {
                    println!("renamed {} to {}", schema.id, schema.name);
                }
            }
            SchemaSubcommands::Update(args) => {
                let current = engine.get_schema(&args.id)?;
                let name = args.name.as_deref().unwrap_or(&current.name);
                let draft = dispatch::schema_draft(name, &args.definition)?;
                let schema = engine.update_schema(&args.id, &draft)?;
                if args.json {
                    print_json(&schema)?;
                } else {
                    println!("updated {} {}", schema.id, schema.name);
                }
            }
            SchemaSubcommands::Rm(args) => {
                let summary = engine.delete_schema(&args.id)?;
                if args.json {
                    print_json(&summary)?;
                } else {
                    println!(
                        "deleted {} ({} item(s), {} neighbor(s) updated, {} task(s))",
                        summary.schema_id,
                        summary.items_deleted,
                        summary.neighbors_updated,
                        summary.tasks_deleted
                    );
                }
            }
        },
        Commands::Item(args) => match args.command {
            ItemSubcommands::New(args) => {
                let schema = engine.get_schema(&args.schema)?;
                let draft = dispatch::new_item_draft(&schema, &args.name, &args.values)?;
                let item = engine.create_item(&schema.id, &draft)?;
                if args.json {
                    print_json(&item)?;
                } else {
                    println!("created {} {}", item.id, item.descriptive_name);
                }
            }
            ItemSubcommands::Show(args) => {
                let item = engine.get_item(&args.schema, &args.id)?;
                if args.json {
                    print_json(&item)?;
                } else {
                    ui::print_item(&item);
                }
            }
            ItemSubcommands::Ls(args) => {
                let items = engine.list_items(&args.schema)?;
                if args.json {
                    print_json(&items)?;
                } else {
                    ui::print_item_list(&items);
                }
            }
            ItemSubcommands::Page(args) => {
                let items = engine.page_items(&args.schema, args.offset, !args.desc)?;
                if args.json {
                    print_json(&items)?;
                } else {
                    println!("offset {} (page size {})", args.offset, engine.page_size());
                    ui::print_item_list(&items);
                }
            }
            ItemSubcommands::Find(args) => {
                let items = engine.find_items(&args.schema, &args.needle, args.ignore_case)?;
                if args.json {
                    print_json(&items)?;
                } else {
                    ui::print_item_list(&items);
                }
            }
            ItemSubcommands::Update(args) => {
                let schema = engine.get_schema(&args.schema)?;
                let current = engine.get_item(&args.schema, &args.id)?;
                let draft = dispatch::update_item_draft(
                    &schema,
                    &current,
                    args.name.as_deref(),
                    &args.values,
                )?;
                let item = engine.update_item(&args.schema, &args.id, &draft, args.if_match)?;
                if args.json {
                    print_json(&item)?;
                } else {
                    println!("updated {} (v{})", item.id, item.version);
                }
            }
            ItemSubcommands::Rm(args) => {
                engine.delete_item(&args.schema, &args.id)?;
                println!("deleted {}", args.id);
            }
            ItemSubcommands::BulkRm(args) => {
                let summary = engine.bulk_delete_items(&args.schema, &args.ids)?;
                if args.json {
                    print_json(&summary)?;
                } else {
                    println!("deleted {} item(s)", summary.deleted.len());
                    for missing in &summary.missing {
                        println!("missing {missing}");
                    }
                }
            }
        },
        Commands::Edge(args) => match args.command {
            EdgeSubcommands::Add(args) => {
                let changed =
                    engine.add_edge(&args.schema, &args.item, &args.target_schema, &args.target_item)?;
                println!(
                    "{} {} -> {}",
                    if changed { "linked" } else { "already linked" },
                    args.item,
                    args.target_item
                );
            }
            EdgeSubcommands::Rm(args) => {
                let changed = engine.remove_edge(
                    &args.schema,
                    &args.item,
                    &args.target_schema,
                    &args.target_item,
                )?;
                println!(
                    "{} {} -> {}",
                    if changed { "unlinked" } else { "not linked" },
                    args.item,
                    args.target_item
                );
            }
        },
        Commands::Task(args) => match args.command {
            TaskSubcommands::New(args) => {
                let draft = domain::task::TaskDraft {
                    environment_id: args.env,
                    assigned_user_id: args.assign.unwrap_or_else(|| cli.user.clone()),
                    workspace_id: args.workspace,
                    app_id: args.app,
                    item_id: args.item,
                    information: args.information,
                    due_date: args.due,
                    finished: args.finished,
                };
                let task = engine.create_task(&draft)?;
                if args.json {
                    print_json(&task)?;
                } else {
                    println!("created {}", task.id);
                }
            }
            TaskSubcommands::Show(args) => {
                let task = engine.get_task(&args.id)?;
                if args.json {
                    print_json(&task)?;
                } else {
                    ui::print_task_list(std::slice::from_ref(&task));
                }
            }
            TaskSubcommands::Ls(args) => {
                let user = args.for_user.unwrap_or_else(|| engine.actor().to_string());
                let tasks = engine.tasks_for_user(&user, args.env.as_deref())?;
                if args.json {
                    print_json(&tasks)?;
                } else {
                    ui::print_task_list(&tasks);
                }
            }
            TaskSubcommands::Done(args) => {
                let task = engine.set_task_finished(&args.id, !args.undo)?;
                if args.json {
                    print_json(&task)?;
                } else {
                    let state = if task.finished { "finished" } else { "reopened" };
                    println!("{state} {}", task.id);
                }
            }
            TaskSubcommands::Rm(args) => {
                engine.delete_task(&args.id)?;
                println!("deleted {}", args.id);
            }
            TaskSubcommands::Revoke(args) => {
                let removed = engine.revoke_environment_access(&args.user_id, &args.env)?;
                println!("removed {removed} task(s) of {} in {}", args.user_id, args.env);
            }
            TaskSubcommands::Purge(args) => {
                let scope = match (&args.workspace, &args.app, &args.item) {
                    (Some(id), _, _) => domain::task::TaskScope::Workspace(id),
                    (_, Some(id), _) => domain::task::TaskScope::App(id),
                    (_, _, Some(id)) => domain::task::TaskScope::Item(id),
                    _ => return Err(CliError::Usage("task purge needs a scope".to_string())),
                };
                if args.dry_run {
                    for task_id in engine.tasks_referencing(scope)? {
                        println!("{task_id}");
                    }
                } else {
                    let removed = engine.delete_tasks_referencing(scope)?;
                    println!("removed {removed} task(s)");
                }
            }
        },
        Commands::Workspace(args) => match args.command {
            WorkspaceSubcommands::Purge(args) => {
                let summary = engine.purge_workspace(&args.id)?;
                if args.json {
                    print_json(&summary)?;
                } else {
                    println!(
                        "purged {} ({} schema(s), {} task(s))",
                        summary.workspace_id,
                        summary.schemas.len(),
                        summary.tasks_deleted
                    );
                }
            }
        },
        Commands::Log(args) => match args.command {
            LogSubcommands::Add(args) => {
                let entry = engine.add_activity(&args.schema, &args.item, &args.text)?;
                if args.json {
                    print_json(&entry)?;
                } else {
                    println!("logged {}", entry.id);
                }
            }
            LogSubcommands::Ls(args) => {
                let entries = engine.list_activity(&args.schema, &args.item)?;
                if args.json {
                    print_json(&entries)?;
                } else {
                    ui::print_activity(&entries);
                }
            }
        },
        Commands::Fsck(args) => {
            let report = engine.fsck(args.repair)?;
            if args.json {
                print_json(&report)?;
            } else {
                ui::print_fsck_report(&report);
            }
            if !report.ok() {
                return Err(CliError::Usage(format!(
                    "fsck found {} issue(s)",
                    report.issues.len()
                )));
            }
        }
        Commands::Seed(args) => {
            let summary = seed::seed_sample_schemas(&engine, &args.workspace)?;
            if args.json {
                print_json(&summary)?;
            } else {
                println!(
                    "seeded {} client(s) into {} and {} invoice(s) into {}",
                    summary.clients,
                    summary.clients_schema_id,
                    summary.invoices,
                    summary.invoices_schema_id
                );
            }
        }
    }

    Ok(())
}
