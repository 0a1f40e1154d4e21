use std::env;
use std::process;

use conversation_module::{
    AgentConfig, ChatCompletionClient, Collaborators, ConversationError, GoogleTokenClient,
    HttpScheduleManager, JobRunner, PineconeClient, PostmarkNotifier, RunSummary,
    SupabaseRecordStore,
};
use send_emails_module::GmailClient;
use tracing::{error, info};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

const EXIT_OK: i32 = 0;
const EXIT_ERROR: i32 = 1;
const EXIT_SEND_LIMIT: i32 = 2;

fn main() {
    tracing_subscriber::fmt().with_target(false).init();

    let args: Vec<String> = env::args().skip(1).collect();
    if args.iter().any(|arg| arg == "--help" || arg == "-h") {
        print_usage();
        return;
    }

    let code = match run(&args) {
        Ok(code) => code,
        Err(err) => {
            error!("converse-agent failed: {}", err);
            EXIT_ERROR
        }
    };
    process::exit(code);
}

fn run(args: &[String]) -> Result<i32, BoxError> {
    let config = AgentConfig::from_env()?;
    let job_id = parse_arg(args, "--job-id")
        .or_else(|| config.default_job_id.clone())
        .ok_or("missing --job-id (or DEFAULT_JOB_ID)")?;
    let member_id = parse_arg(args, "--member-id");

    let store = SupabaseRecordStore::new(&config.supabase_db_url)?;
    let mail = GmailClient::new(&config.gmail)?;
    let identity = GoogleTokenClient::new(config.google.clone())?;
    let knowledge = PineconeClient::new(config.pinecone.clone())?;
    let llm = ChatCompletionClient::new(config.llm.clone())?;
    let notifier = PostmarkNotifier::new(config.postmark.clone(), &config.notify_from);
    let schedules = HttpScheduleManager::new(config.schedule.clone())?;

    let runner = JobRunner::new(
        Collaborators {
            store: &store,
            mail: &mail,
            identity: &identity,
            knowledge: &knowledge,
            llm: &llm,
            notifier: &notifier,
            schedules: &schedules,
        },
        config.runner,
    );

    let result = match member_id.as_deref() {
        Some(member_id) => runner.run_member(&job_id, member_id),
        None => runner.run(&job_id),
    };
    match result {
        Ok(summary) => {
            println!("{}", serde_json::to_string_pretty(&summary)?);
            Ok(exit_code(&summary))
        }
        Err(ConversationError::RateLimitHalt { message }) => {
            error!("run for job {} halted: {}", job_id, message);
            Ok(EXIT_SEND_LIMIT)
        }
        Err(err) => {
            error!("run for job {} failed: {}", job_id, err);
            Ok(EXIT_ERROR)
        }
    }
}

fn exit_code(summary: &RunSummary) -> i32 {
    info!(
        "job {} finished: {} success, {} no action, {} errors",
        summary.job_id, summary.success, summary.no_action, summary.error
    );
    if summary.error > 0 {
        EXIT_ERROR
    } else {
        EXIT_OK
    }
}

fn parse_arg(args: &[String], flag: &str) -> Option<String> {
    let prefix = format!("{}=", flag);
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        if arg == flag {
            return iter.next().cloned();
        }
        if let Some(value) = arg.strip_prefix(&prefix) {
            return Some(value.to_string());
        }
    }
    None
}

fn print_usage() {
    eprintln!(
        "Usage: converse-agent --job-id <id> [--member-id <id>]\n\
         \n\
         Runs one conversation turn for every member of the job (or only the given member).\n\
         Falls back to DEFAULT_JOB_ID when --job-id is absent.\n\
         Exit codes: 0 ok, 1 error, 2 daily send limit reached."
    );
}
