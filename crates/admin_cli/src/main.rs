use std::error::Error;

use chrono::{NaiveDate, Utc};
use clap::{Args, Parser, Subcommand};
use ledger::{
    AccountKind, Actor, CategoryGrouping, Engine, Frequency, MoneyCents, NewAccountCmd,
    NewRecurringRuleCmd, PostCmd, PostingListFilter, Role, RuleKind, TransactionKind,
    TransferCmd,
};
use migration::MigratorTrait;
use sea_orm::{Database, DatabaseConnection};
use serde::Serialize;
use uuid::Uuid;

type CliResult<T> = Result<T, Box<dyn Error + Send + Sync>>;

#[derive(Parser, Debug)]
#[command(name = "hearth_admin")]
#[command(about = "Admin utilities for the hearth ledger (bootstrap, postings, reports)")]
struct Cli {
    /// Database connection string (also read from `DATABASE_URL`).
    #[arg(long, env = "DATABASE_URL", default_value = "sqlite:./hearth.db?mode=rwc")]
    database_url: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create a family.
    Family {
        #[arg(long)]
        name: String,
    },
    /// Add a member (and their personal account) to a family.
    User(UserArgs),
    Account(AccountArgs),
    /// Record an income or expense.
    Post(PostArgs),
    Transfer(TransferArgs),
    #[command(subcommand)]
    Rule(RuleCommand),
    /// Run one scheduler tick for `date` (default: today, UTC).
    Tick {
        #[arg(long)]
        date: Option<NaiveDate>,
    },
    #[command(subcommand)]
    Report(ReportCommand),
}

#[derive(Args, Debug)]
struct UserArgs {
    #[arg(long)]
    family: Uuid,
    #[arg(long)]
    name: String,
    #[arg(long)]
    display_name: String,
    #[arg(long, value_parser = parse_role)]
    role: Role,
}

#[derive(Args, Debug)]
struct AccountArgs {
    /// Acting user.
    #[arg(long = "as")]
    actor: Uuid,
    #[arg(long)]
    name: String,
    #[arg(long, value_parser = parse_account_kind)]
    kind: AccountKind,
    #[arg(long)]
    owner: Option<Uuid>,
    /// Goal amount, e.g. `1500.00` (goal accounts only).
    #[arg(long, value_parser = parse_money)]
    goal: Option<i64>,
    #[arg(long)]
    goal_date: Option<NaiveDate>,
    #[arg(long)]
    share_with: Vec<Uuid>,
}

#[derive(Args, Debug)]
struct PostArgs {
    #[arg(long = "as")]
    actor: Uuid,
    #[arg(long)]
    account: Uuid,
    #[arg(long, value_parser = parse_transaction_kind)]
    kind: TransactionKind,
    #[arg(long, value_parser = parse_money)]
    amount: i64,
    #[arg(long)]
    description: Option<String>,
    #[arg(long)]
    category: Option<Uuid>,
    #[arg(long)]
    family_expense: bool,
}

#[derive(Args, Debug)]
struct TransferArgs {
    #[arg(long = "as")]
    actor: Uuid,
    #[arg(long)]
    from: Uuid,
    #[arg(long)]
    to: Uuid,
    #[arg(long, value_parser = parse_money)]
    amount: i64,
    #[arg(long)]
    description: Option<String>,
}

#[derive(Subcommand, Debug)]
enum RuleCommand {
    Create(RuleCreateArgs),
    List {
        #[arg(long = "as")]
        actor: Uuid,
    },
    /// Pause or resume a rule.
    Toggle {
        #[arg(long = "as")]
        actor: Uuid,
        #[arg(long)]
        id: Uuid,
    },
}

#[derive(Args, Debug)]
struct RuleCreateArgs {
    #[arg(long = "as")]
    actor: Uuid,
    #[arg(long)]
    description: String,
    #[arg(long, value_parser = parse_rule_kind)]
    kind: RuleKind,
    #[arg(long, value_parser = parse_money)]
    amount: i64,
    #[arg(long, value_parser = parse_frequency)]
    frequency: Frequency,
    #[arg(long)]
    start: NaiveDate,
    #[arg(long)]
    end: Option<NaiveDate>,
    #[arg(long)]
    from: Option<Uuid>,
    #[arg(long)]
    to: Option<Uuid>,
    #[arg(long)]
    category: Option<Uuid>,
}

#[derive(Subcommand, Debug)]
enum ReportCommand {
    Accounts {
        #[arg(long = "as")]
        actor: Uuid,
        #[arg(long)]
        include_archived: bool,
    },
    Postings {
        #[arg(long = "as")]
        actor: Uuid,
        #[arg(long)]
        account: Option<Uuid>,
        #[arg(long)]
        limit: Option<u64>,
    },
    Summary {
        #[arg(long = "as")]
        actor: Uuid,
        #[arg(long)]
        as_of: Option<NaiveDate>,
    },
    Forecast {
        #[arg(long = "as")]
        actor: Uuid,
        #[arg(long)]
        as_of: Option<NaiveDate>,
    },
    Categories {
        #[arg(long = "as")]
        actor: Uuid,
        #[arg(long)]
        from: NaiveDate,
        #[arg(long)]
        to: NaiveDate,
        /// Roll subcategories up into their top-level category.
        #[arg(long)]
        by_parent: bool,
    },
    Trend {
        #[arg(long = "as")]
        actor: Uuid,
        #[arg(long, default_value_t = 6)]
        months: u32,
    },
    Goals {
        #[arg(long = "as")]
        actor: Uuid,
    },
    /// Accounts whose stored balance differs from their postings.
    Audit {
        #[arg(long = "as")]
        actor: Uuid,
    },
}

fn parse_role(raw: &str) -> Result<Role, String> {
    Role::try_from(raw).map_err(|err| err.to_string())
}

fn parse_account_kind(raw: &str) -> Result<AccountKind, String> {
    AccountKind::try_from(raw).map_err(|err| err.to_string())
}

fn parse_transaction_kind(raw: &str) -> Result<TransactionKind, String> {
    TransactionKind::try_from(raw).map_err(|err| err.to_string())
}

fn parse_rule_kind(raw: &str) -> Result<RuleKind, String> {
    RuleKind::try_from(raw).map_err(|err| err.to_string())
}

fn parse_frequency(raw: &str) -> Result<Frequency, String> {
    Frequency::try_from(raw).map_err(|err| err.to_string())
}

fn parse_money(raw: &str) -> Result<i64, String> {
    raw.parse::<MoneyCents>()
        .map(i64::from)
        .map_err(|err| err.to_string())
}

fn print_json<T: Serialize>(value: &T) -> CliResult<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn connect_db(database_url: &str) -> CliResult<DatabaseConnection> {
    let db = Database::connect(database_url).await?;
    migration::Migrator::up(&db, None).await?;
    Ok(db)
}

async fn load(engine: &Engine, user_id: Uuid) -> CliResult<Actor> {
    Ok(engine.actor(user_id).await?)
}

async fn run(engine: &Engine, command: Command) -> CliResult<()> {
    let today = Utc::now().date_naive();
    let now = Utc::now();

    match command {
        Command::Family { name } => print_json(&engine.create_family(&name).await?)?,
        Command::User(args) => {
            let user = engine
                .create_user(args.family, &args.name, &args.display_name, args.role)
                .await?;
            print_json(&user)?;
        }
        Command::Account(args) => {
            let actor = load(engine, args.actor).await?;
            let mut cmd = NewAccountCmd::new(actor, args.name, args.kind);
            if let Some(owner) = args.owner {
                cmd = cmd.owner(owner);
            }
            if let Some(goal) = args.goal {
                cmd = cmd.goal(goal, args.goal_date);
            }
            for user_id in args.share_with {
                cmd = cmd.share_with(user_id);
            }
            print_json(&engine.create_account(cmd).await?)?;
        }
        Command::Post(args) => {
            let mut cmd = PostCmd::new(
                load(engine, args.actor).await?,
                args.account,
                args.kind,
                args.amount,
                now,
            );
            cmd.description = args.description;
            cmd.category_id = args.category;
            cmd.is_family_expense = args.family_expense;
            print_json(&engine.post(cmd).await?)?;
        }
        Command::Transfer(args) => {
            let actor = load(engine, args.actor).await?;
            let mut cmd = TransferCmd::new(actor, args.from, args.to, args.amount, now);
            cmd.description = args.description;
            let transfer_id = engine.transfer(cmd).await?;
            let legs = engine.transfer_legs(&actor, transfer_id).await?;
            print_json(&legs)?;
        }
        Command::Rule(RuleCommand::Create(args)) => {
            let mut cmd = NewRecurringRuleCmd::new(
                load(engine, args.actor).await?,
                args.description,
                args.kind,
                args.amount,
                args.frequency,
                args.start,
            );
            cmd.end_date = args.end;
            cmd.from_account_id = args.from;
            cmd.to_account_id = args.to;
            cmd.category_id = args.category;
            print_json(&engine.create_recurring_rule(cmd).await?)?;
        }
        Command::Rule(RuleCommand::List { actor: id }) => {
            print_json(&engine.list_rules(&load(engine, id).await?).await?)?;
        }
        Command::Rule(RuleCommand::Toggle { actor: id, id: rule_id }) => {
            print_json(&engine.toggle_rule(&load(engine, id).await?, rule_id).await?)?;
        }
        Command::Tick { date } => {
            let report = engine.run_due_rules(date.unwrap_or(today)).await?;
            print_json(&report)?;
        }
        Command::Report(report) => run_report(engine, report, today).await?,
    }
    Ok(())
}

async fn run_report(engine: &Engine, report: ReportCommand, today: NaiveDate) -> CliResult<()> {
    match report {
        ReportCommand::Accounts {
            actor,
            include_archived,
        } => {
            let actor = load(engine, actor).await?;
            print_json(&engine.list_accounts(&actor, None, include_archived).await?)
        }
        ReportCommand::Postings {
            actor,
            account,
            limit,
        } => {
            let actor = load(engine, actor).await?;
            let filter = PostingListFilter {
                account_id: account,
                limit,
                ..Default::default()
            };
            print_json(&engine.list_postings(&actor, &filter).await?)
        }
        ReportCommand::Summary { actor, as_of } => {
            let actor = load(engine, actor).await?;
            print_json(&engine.summary(&actor, as_of.unwrap_or(today)).await?)
        }
        ReportCommand::Forecast { actor, as_of } => {
            let actor = load(engine, actor).await?;
            print_json(&engine.forecast(&actor, as_of.unwrap_or(today)).await?)
        }
        ReportCommand::Categories {
            actor,
            from,
            to,
            by_parent,
        } => {
            let actor = load(engine, actor).await?;
            let grouping = if by_parent {
                CategoryGrouping::Parent
            } else {
                CategoryGrouping::Leaf
            };
            print_json(
                &engine
                    .category_breakdown(&actor, from, to, grouping)
                    .await?,
            )
        }
        ReportCommand::Trend { actor, months } => {
            let actor = load(engine, actor).await?;
            print_json(&engine.monthly_trend(&actor, months, today).await?)
        }
        ReportCommand::Goals { actor } => {
            let actor = load(engine, actor).await?;
            print_json(&engine.goal_progress(&actor, today).await?)
        }
        ReportCommand::Audit { actor } => {
            let actor = load(engine, actor).await?;
            print_json(&engine.audit_balances(&actor).await?)
        }
    }
}

#[tokio::main]
async fn main() -> CliResult<()> {
    let cli = Cli::parse();
    let db = connect_db(&cli.database_url).await?;
    let engine = Engine::builder().database(db).build().await?;

    if let Err(err) = run(&engine, cli.command).await {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
    Ok(())
}
