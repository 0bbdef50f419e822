use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use itertools::Itertools;
use rustyline::{error::ReadlineError, Editor};
use structopt::StructOpt;
use tokio::runtime::Runtime;
use tracing_subscriber::EnvFilter;

use workout_rules::config::Config;
use workout_rules::grammar::{GrammarCatalog, ValueDomain};
use workout_rules::{parse_rule, validate, Action, AuthoringSession, RuleDraft, RuleStoreClient};

const HELP: &str = "\
cond <variable> <operator> <value>     add a condition
rm <index>                             remove a condition
action include_exercise <exercise>     include an exercise
action sets <sets> <reps>              set sets and reps
action set_rest_time <min> <max>       rest bounds, e.g. 90s 2m (bare numbers are seconds)
show                                   print the draft
submit                                 validate and store the draft
clear                                  start a new draft
rule ...                               check a DSL statement without storing it
list | grammar | reload | help | quit";

#[derive(Debug, StructOpt)]
#[structopt(name = "workout-rules", about = "Author and validate workout plan rules")]
struct Opt {
    /// Base URL of the rule service (overrides WORKOUT_RULES_SERVER_URL)
    #[structopt(long)]
    server_url: Option<String>,

    /// Rule section (overrides WORKOUT_RULES_SECTION)
    #[structopt(long)]
    section: Option<String>,

    #[structopt(long)]
    timeout_secs: Option<u64>,

    #[structopt(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, StructOpt)]
enum Command {
    /// Print the stored rules of the section
    List,
    /// Print variables, operators and actions offered by the grammar
    Grammar,
    /// Parse and validate a rule locally
    Check { rule: String },
    /// Parse, validate and store a rule
    Submit { rule: String },
}

enum Reply {
    Output(String),
    Quit,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("workout_rules=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let opt = Opt::from_args();
    let mut config = Config::load()?;
    if let Some(server_url) = opt.server_url {
        config.server_url = server_url;
    }
    if let Some(section) = opt.section {
        config.section = section;
    }
    if let Some(secs) = opt.timeout_secs {
        config.timeout = Duration::from_secs(secs);
    }
    config.validate()?;

    let runtime = Runtime::new().context("Failed to start async runtime")?;
    let client = RuleStoreClient::new(config.server_url.as_str(), config.timeout)?;
    let mut session = runtime
        .block_on(AuthoringSession::open(client, config.section.as_str()))
        .context("Cannot author rules without the grammar")?;

    match opt.command {
        Some(Command::List) => println!("{}", list_rules(&runtime, &session)?),
        Some(Command::Grammar) => println!("{}", describe_catalog(session.catalog())),
        Some(Command::Check { rule }) => println!("{}", check_text(session.catalog(), &rule)?),
        Some(Command::Submit { rule }) => {
            let parsed = parse_rule(&rule)?;
            let stored = runtime.block_on(session.submit_rule(&parsed, session.catalog()))?;
            println!("{}", stored.to_dsl());
        }
        None => repl(&runtime, &mut session)?,
    }

    Ok(())
}

fn repl(runtime: &Runtime, session: &mut AuthoringSession) -> Result<()> {
    let mut editor = Editor::<()>::new();
    let mut draft = session.new_draft();
    println!("Authoring {:?} rules. Type `help` for commands.", session.section());

    loop {
        let readline = editor.readline("> ");
        match readline {
            Ok(line) => {
                editor.add_history_entry(line.as_str());

                match handle_input(runtime, session, &mut draft, &line) {
                    Ok(Reply::Output(output)) => {
                        if !output.is_empty() {
                            println!("{}", output);
                        }
                    }
                    Ok(Reply::Quit) => break,
                    Err(e) => {
                        println!("Error: {:#}", e);
                    }
                }
            }
            Err(ReadlineError::Interrupted) => break,
            Err(ReadlineError::Eof) => break,
            Err(err) => {
                println!("Error: {}", err);
                break;
            }
        }
    }

    Ok(())
}

fn handle_input(
    runtime: &Runtime,
    session: &mut AuthoringSession,
    draft: &mut RuleDraft,
    line: &str,
) -> Result<Reply> {
    let line = line.trim();
    let (command, rest) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
    let rest = rest.trim();

    let output = match command {
        "" => String::new(),
        "help" => HELP.to_owned(),
        "quit" | "exit" => return Ok(Reply::Quit),
        "cond" => {
            let mut parts = rest.splitn(3, char::is_whitespace);
            let variable = parts.next().unwrap_or_default();
            let operator = parts.next().unwrap_or_default();
            let value = unquote(parts.next().unwrap_or_default().trim());
            draft.add_condition(variable, operator, value)?;
            describe_draft(draft)
        }
        "rm" => {
            let index = rest.parse().context("rm takes a condition index")?;
            draft.remove_condition(index)?;
            describe_draft(draft)
        }
        "action" => {
            draft.set_action(parse_action(rest)?)?;
            describe_draft(draft)
        }
        "show" => describe_draft(draft),
        "clear" => {
            *draft = session.new_draft();
            describe_draft(draft)
        }
        "submit" => {
            // A rejected draft stays as it is so it can be corrected.
            let stored = runtime.block_on(session.submit(draft))?;
            *draft = session.new_draft();
            format!("Stored: {}", stored.to_dsl())
        }
        "list" => list_rules(runtime, session)?,
        "grammar" => describe_catalog(session.catalog()),
        "reload" => {
            runtime.block_on(session.reload_grammar())?;
            "Grammar reloaded; `clear` starts a draft against it.".to_owned()
        }
        "rule" => check_text(draft.catalog(), line)?,
        other => bail!("unknown command {:?}; type `help`", other),
    };

    Ok(Reply::Output(output))
}

fn parse_action(input: &str) -> Result<Action> {
    let (kind, args) = input.split_once(char::is_whitespace).unwrap_or((input, ""));
    let args: Vec<_> = args.split_whitespace().collect();

    match (kind, args.as_slice()) {
        ("include_exercise", _) => Ok(Action::IncludeExercise {
            exercise_name: unquote(input[kind.len()..].trim()).to_owned(),
        }),
        ("sets", [sets, reps]) => Ok(Action::Sets {
            sets_count: sets.parse().context("sets must be a whole number")?,
            reps_count: reps.parse().context("reps must be a whole number")?,
        }),
        ("set_rest_time", [min, max]) => Ok(Action::SetRestTime {
            min_rest_seconds: parse_seconds(min)?,
            max_rest_seconds: parse_seconds(max)?,
        }),
        _ => Err(anyhow!("usage: action include_exercise <name> | sets <sets> <reps> | set_rest_time <min> <max>")),
    }
}

fn parse_seconds(input: &str) -> Result<u32> {
    let (digits, factor) = match input.strip_suffix('m') {
        Some(minutes) => (minutes, 60),
        None => (input.strip_suffix('s').unwrap_or(input), 1),
    };
    let amount: u32 = digits
        .parse()
        .with_context(|| format!("{:?} is not a rest time", input))?;
    amount
        .checked_mul(factor)
        .ok_or_else(|| anyhow!("{:?} is too long", input))
}

fn unquote(s: &str) -> &str {
    s.strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .unwrap_or(s)
}

fn check_text(catalog: &GrammarCatalog, text: &str) -> Result<String> {
    let rule = parse_rule(text)?;
    match validate(&rule, catalog) {
        Ok(()) => Ok(format!("Valid: {}", rule.to_dsl())),
        Err(errors) => Err(anyhow!(
            "{}",
            errors.iter().map(ToString::to_string).join("\n")
        )),
    }
}

fn list_rules(runtime: &Runtime, session: &AuthoringSession) -> Result<String> {
    let rules = runtime.block_on(session.list())?;
    if rules.is_empty() {
        return Ok("No rules defined yet".to_owned());
    }
    Ok(rules
        .iter()
        .map(|rule| match rule.id {
            Some(id) => format!("#{} {}", id, rule.to_dsl()),
            None => rule.to_dsl(),
        })
        .join("\n"))
}

fn describe_draft(draft: &RuleDraft) -> String {
    let mut s = String::new();
    for (i, condition) in draft.conditions().iter().enumerate() {
        s.push_str(&format!("[{}] {}\n", i, condition.to_dsl()));
    }
    match draft.action() {
        Some(action) => s.push_str(&format!("then {}", action.to_dsl())),
        None => s.push_str("(no action)"),
    }
    if let Ok(rule) = draft.to_draft_rule() {
        s.push_str(&format!("\n{}", rule.to_dsl()));
    }
    s
}

fn describe_catalog(catalog: &GrammarCatalog) -> String {
    let mut lines = vec![];
    for variable in catalog.variables() {
        let domain = match catalog.domain_of(variable) {
            Some(ValueDomain::Enumerated(values)) => format!("one of {}", values.join(", ")),
            Some(ValueDomain::NumericRange(range)) => format!("number {}", range.describe()),
            None => continue,
        };
        lines.push(format!("{}: {}", variable, domain));
    }
    lines.push(format!("operators: {}", catalog.operators().join(" ")));
    lines.push(format!("actions: {}", catalog.action_types().join(", ")));
    lines.push(format!("exercises: {}", catalog.exercise_names().join(", ")));
    lines.join("\n")
}
