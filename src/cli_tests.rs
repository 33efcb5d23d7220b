use clap::Parser;

use super::{
    Cli, Commands, ItemSubcommands, SchemaSubcommands, TaskSubcommands,
};

fn parse(args: &[&str]) -> Cli {
    Cli::parse_from(args)
}

#[test]
fn schema_new_collects_repeated_fields_and_relations() {
    let cli = parse(&[
        "schemata",
        "schema",
        "new",
        "Invoices",
        "--workspace",
        "W-1",
        "-f",
        "Paid:boolean",
        "--field",
        "Total:decimal",
        "--relation",
        "Client=S-1",
        "--json",
    ]);
    match cli.command {
        Commands::Schema(args) => match args.command {
            SchemaSubcommands::New(new_args) => {
                assert_eq!(new_args.name, "Invoices");
                assert_eq!(new_args.workspace, "W-1");
                assert_eq!(
                    new_args.definition.fields,
                    vec!["Paid:boolean".to_string(), "Total:decimal".to_string()]
                );
                assert_eq!(new_args.definition.relations, vec!["Client=S-1".to_string()]);
                assert!(new_args.json);
            }
            other => panic!("expected New, got {:?}", other),
        },
        other => panic!("expected Schema, got {:?}", other),
    }
}

#[test]
fn global_flags_may_follow_the_subcommand() {
    let cli = parse(&[
        "schemata",
        "item",
        "ls",
        "S-1",
        "--db",
        "/tmp/store.sqlite",
        "--user",
        "bob",
        "--log-json",
    ]);
    assert_eq!(cli.db, "/tmp/store.sqlite");
    assert_eq!(cli.user, "bob");
    assert!(cli.log_json);
    assert!(matches!(
        cli.command,
        Commands::Item(args) if matches!(args.command, ItemSubcommands::Ls(_))
    ));
}

#[test]
fn item_update_parses_values_links_and_version() {
    let cli = parse(&[
        "schemata",
        "item",
        "update",
        "S-1",
        "I-1",
        "--set",
        "Total=12.5",
        "--link",
        "Client=I-9",
        "--if-match",
        "3",
    ]);
    match cli.command {
        Commands::Item(args) => match args.command {
            ItemSubcommands::Update(update) => {
                assert_eq!(update.values.set, vec!["Total=12.5".to_string()]);
                assert_eq!(update.values.link, vec!["Client=I-9".to_string()]);
                assert_eq!(update.if_match, Some(3));
                assert!(update.name.is_none());
            }
            other => panic!("expected Update, got {:?}", other),
        },
        other => panic!("expected Item, got {:?}", other),
    }
}

#[test]
fn bulk_rm_requires_at_least_one_id() {
    assert!(Cli::try_parse_from(["schemata", "item", "bulk-rm", "S-1"]).is_err());
    let cli = parse(&["schemata", "item", "bulk-rm", "S-1", "I-1", "I-2"]);
    match cli.command {
        Commands::Item(args) => match args.command {
            ItemSubcommands::BulkRm(bulk) => assert_eq!(bulk.ids.len(), 2),
            other => panic!("expected BulkRm, got {:?}", other),
        },
        other => panic!("expected Item, got {:?}", other),
    }
}

#[test]
fn task_purge_needs_exactly_one_scope() {
    assert!(Cli::try_parse_from(["schemata", "task", "purge"]).is_err());
    assert!(
        Cli::try_parse_from(["schemata", "task", "purge", "--app", "S-1", "--item", "I-1"])
            .is_err()
    );
    let cli = parse(&["schemata", "task", "purge", "--item", "I-1", "--dry-run"]);
    match cli.command {
        Commands::Task(args) => match args.command {
            TaskSubcommands::Purge(purge) => {
                assert_eq!(purge.item.as_deref(), Some("I-1"));
                assert!(purge.dry_run);
            }
            other => panic!("expected Purge, got {:?}", other),
        },
        other => panic!("expected Task, got {:?}", other),
    }
}

#[test]
fn fsck_repair_flag_parses() {
    let cli = parse(&["schemata", "fsck", "--repair"]);
    match cli.command {
        Commands::Fsck(args) => {
            assert!(args.repair);
            assert!(!args.json);
        }
        other => panic!("expected Fsck, got {:?}", other),
    }
}
