use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use evolution_context_core::{
    clamp_limit, context_limit, meets_threshold, policy_table, prepare_report_context,
    select_temporal_context_traced, selection_digest, threshold, ContextError, ReflectionRecord,
    ReflectionSource, ReportKind, ReportRequest, ReportSubject, Tier, TierResolver,
};
use serde_json::{Map, Value};
use time::OffsetDateTime;
use tracing_subscriber::EnvFilter;

const CLI_CONTRACT_VERSION: &str = "cli.v1";

type Payload = Map<String, Value>;

#[derive(Debug, Parser)]
#[command(name = "ecx")]
#[command(about = "Evolution report context selection")]
struct Cli {
    /// Log filter for stderr output, e.g. `info` or `evolution_context_core=debug`.
    #[arg(long, env = "ECX_LOG", default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    Policy {
        #[command(subcommand)]
        command: PolicyCommand,
    },
    Select(SelectArgs),
}

#[derive(Debug, Subcommand)]
enum PolicyCommand {
    Show,
    Check(PolicyCheckArgs),
}

#[derive(Debug, Args)]
struct PolicyCheckArgs {
    #[arg(long, allow_negative_numbers = true)]
    count: i64,
    #[arg(long, value_enum)]
    kind: KindArg,
    #[arg(long, value_enum)]
    tier: Option<TierArg>,
}

#[derive(Debug, Args)]
struct SelectArgs {
    /// JSON array of reflection objects, each with `id` and `created_at`.
    #[arg(long = "in")]
    input: PathBuf,
    #[arg(long, value_enum)]
    kind: KindArg,
    #[arg(long, value_enum, env = "ECX_TIER")]
    tier: TierArg,
    #[arg(long, default_value = "local")]
    user_id: String,
    /// Required for dream-specific reports; matched against each reflection's `dream_id`.
    #[arg(long, required_if_eq("kind", "dream_specific"))]
    dream_id: Option<String>,
    /// Override the tier's context limit and skip policy gating.
    #[arg(long, allow_negative_numbers = true)]
    limit: Option<i64>,
    #[arg(long)]
    as_of: Option<String>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum TierArg {
    Free,
    Pro,
    Unlimited,
}

impl TierArg {
    fn into_tier(self) -> Tier {
        match self {
            Self::Free => Tier::Free,
            Self::Pro => Tier::Pro,
            Self::Unlimited => Tier::Unlimited,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
#[value(rename_all = "snake_case")]
enum KindArg {
    DreamSpecific,
    CrossDream,
}

impl KindArg {
    fn into_kind(self) -> ReportKind {
        match self {
            Self::DreamSpecific => ReportKind::DreamSpecific,
            Self::CrossDream => ReportKind::CrossDream,
        }
    }
}

/// Reflections read once from a JSON file.
struct JsonFileSource {
    records: Vec<ReflectionRecord<Payload>>,
}

impl JsonFileSource {
    fn load(path: &Path) -> Result<Self> {
        let body = fs::read_to_string(path)
            .with_context(|| format!("failed to read reflections file {}", path.display()))?;
        let records = serde_json::from_str::<Vec<ReflectionRecord<Payload>>>(&body)
            .with_context(|| format!("invalid reflections JSON in {}", path.display()))?;
        tracing::debug!(path = %path.display(), count = records.len(), "loaded reflections");
        Ok(Self { records })
    }
}

fn belongs_to_dream(record: &ReflectionRecord<Payload>, dream_id: &str) -> bool {
    match record.payload.get("dream_id").or_else(|| record.payload.get("dreamId")) {
        None => true,
        Some(Value::String(value)) => value == dream_id,
        Some(Value::Number(number)) => {
            dream_id.parse::<serde_json::Number>().is_ok_and(|parsed| parsed == *number)
        }
        Some(_) => false,
    }
}

impl ReflectionSource<Payload> for JsonFileSource {
    fn reflections(
        &self,
        _user_id: &str,
        subject: &ReportSubject,
    ) -> Result<Vec<ReflectionRecord<Payload>>, ContextError> {
        let records = match subject {
            ReportSubject::Dream { dream_id } => self
                .records
                .iter()
                .filter(|record| belongs_to_dream(record, dream_id))
                .cloned()
                .collect(),
            ReportSubject::AllDreams => self.records.clone(),
        };
        Ok(records)
    }
}

struct FixedTier(Tier);

impl TierResolver for FixedTier {
    fn tier_for(&self, _user_id: &str) -> Result<Tier, ContextError> {
        Ok(self.0)
    }
}

fn with_contract_version(value: Value) -> Value {
    match value {
        Value::Object(mut object) => {
            object.insert(
                "contract_version".to_string(),
                Value::String(CLI_CONTRACT_VERSION.to_string()),
            );
            Value::Object(object)
        }
        other => serde_json::json!({
            "contract_version": CLI_CONTRACT_VERSION,
            "payload": other
        }),
    }
}

fn emit_json(value: Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(&with_contract_version(value))?);
    Ok(())
}

fn init_logging(filter: &str) {
    let env_filter = EnvFilter::try_new(filter).unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .with_env_filter(env_filter)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_level);
    match cli.command {
        Command::Policy { command } => run_policy(command),
        Command::Select(args) => run_select(args),
    }
}

fn run_policy(command: PolicyCommand) -> Result<()> {
    match command {
        PolicyCommand::Show => {
            let entries = policy_table()
                .into_iter()
                .map(|(tier, kind, entry)| {
                    serde_json::json!({
                        "tier": tier,
                        "kind": kind,
                        "threshold": entry.threshold,
                        "context_limit": entry.context_limit,
                        "available": entry.is_available(),
                    })
                })
                .collect::<Vec<_>>();
            emit_json(serde_json::json!({ "policies": entries }))
        }
        PolicyCommand::Check(args) => {
            let kind = args.kind.into_kind();
            let mut body = serde_json::json!({
                "count": args.count,
                "kind": kind,
                "threshold": threshold(kind),
                "eligible": meets_threshold(args.count, kind),
            });
            if let (Some(tier), Value::Object(object)) = (args.tier, &mut body) {
                let tier = tier.into_tier();
                let limit = context_limit(tier, kind);
                object.insert("tier".to_string(), serde_json::to_value(tier)?);
                object.insert("context_limit".to_string(), Value::from(limit));
                object.insert("available".to_string(), Value::Bool(limit > 0));
            }
            emit_json(body)
        }
    }
}

fn run_select(args: SelectArgs) -> Result<()> {
    let kind = args.kind.into_kind();
    let tier = args.tier.into_tier();
    let subject = match (kind, args.dream_id) {
        (ReportKind::DreamSpecific, Some(dream_id)) => ReportSubject::Dream { dream_id },
        (ReportKind::DreamSpecific, None) => {
            return Err(anyhow!("--dream-id is required for dream-specific reports"));
        }
        (ReportKind::CrossDream, _) => ReportSubject::AllDreams,
    };
    let as_of = parse_optional_rfc3339(args.as_of.as_deref())?;
    let source = JsonFileSource::load(&args.input)?;

    if let Some(raw_limit) = args.limit {
        if raw_limit < 0 {
            tracing::warn!(limit = raw_limit, "negative context limit clamped to 0");
        }
        let limit = clamp_limit(raw_limit);
        let reflections = source.reflections(&args.user_id, &subject)?;
        let selection = select_temporal_context_traced(&reflections, limit);
        let digest = selection_digest(limit, &selection.records);
        return emit_json(serde_json::json!({
            "user_id": args.user_id,
            "subject": subject,
            "kind": kind,
            "tier": tier,
            "limit": limit,
            "reflection_count": reflections.len(),
            "selection_digest": digest,
            "reflections": selection.records,
            "trace": selection.trace,
        }));
    }

    let context = prepare_report_context(
        &source,
        &FixedTier(tier),
        ReportRequest { user_id: args.user_id, subject, as_of },
    )?;
    emit_json(serde_json::to_value(&context).context("failed to serialize report context")?)
}

fn parse_optional_rfc3339(value: Option<&str>) -> Result<OffsetDateTime> {
    match value {
        Some(raw) => parse_rfc3339(raw),
        None => Ok(OffsetDateTime::now_utc()),
    }
}

fn parse_rfc3339(value: &str) -> Result<OffsetDateTime> {
    let parsed = OffsetDateTime::parse(value, &time::format_description::well_known::Rfc3339)
        .with_context(|| format!("invalid RFC3339 UTC timestamp: {value}"))?;

    if parsed.offset() != time::UtcOffset::UTC {
        return Err(anyhow!("timestamp MUST use UTC offset Z (received: {value})"));
    }

    Ok(parsed)
}
