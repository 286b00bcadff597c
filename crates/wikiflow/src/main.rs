use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Args, CommandFactory, Parser, Subcommand, ValueEnum};
use tracing::warn;
use tracing_subscriber::EnvFilter;
use wikiflow_core::address::{RequestKind, UrlAddress, parse_title, parse_url};
use wikiflow_core::api::{MediaWikiClient, MediaWikiClientConfig, WikiContentService};
use wikiflow_core::config::{WikiflowConfig, load_config};
use wikiflow_core::integrate::{IntegratorOptions, IssueIntegrator, SummaryCheck};
use wikiflow_core::issue::{IssueBranchPlan, branch_issue, list_integration_targets};
use wikiflow_core::merge::merge;
use wikiflow_core::migrate::{
    MigrationAction, MigrationPlan, PagePair, active_flags, collect_pairs, perform_action,
};
use wikiflow_core::rewrite::PrefixRule;
use wikiflow_core::runtime::{
    InitOptions, PathOverrides, ResolutionContext, ResolvedPaths, init_layout, inspect_runtime,
    resolve_paths,
};

#[derive(Debug, Parser)]
#[command(
    name = "wikiflow",
    version,
    about = "Production, prepub and issue environments for MediaWiki page trees"
)]
struct Cli {
    #[arg(long, global = true, value_name = "PATH")]
    project_root: Option<PathBuf>,
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,
    #[arg(long, global = true, help = "Print resolved runtime diagnostics")]
    diagnostics: bool,
    #[arg(short, long, global = true, help = "Log debug events to stderr")]
    verbose: bool,
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Clone)]
struct RuntimeOptions {
    project_root: Option<PathBuf>,
    config: Option<PathBuf>,
    diagnostics: bool,
}

impl RuntimeOptions {
    fn from_cli(cli: &Cli) -> Self {
        Self {
            project_root: cli.project_root.clone(),
            config: cli.config.clone(),
            diagnostics: cli.diagnostics,
        }
    }
}

#[derive(Debug, Subcommand)]
enum Commands {
    #[command(about = "Create .wikiflow/ with a default config")]
    Init(InitArgs),
    #[command(about = "Split a title or wiki URL into its environment parts")]
    Analyze(AnalyzeArgs),
    #[command(about = "Rewrite links, transclusions and file links to another prefix")]
    Rewrite(RewriteArgs),
    #[command(about = "Three-way merge of local files by paragraph")]
    Merge(MergeArgs),
    #[command(about = "List issue pages that can be integrated into a page")]
    Issues(IssuesArgs),
    #[command(about = "Merge an issue page into a production or prepub page")]
    Integrate(IntegrateArgs),
    #[command(name = "branch-issue", about = "Open an issue page for a production page")]
    BranchIssue(BranchIssueArgs),
    #[command(about = "List prepub versions an issue page can be integrated into")]
    Targets(TargetsArgs),
    #[command(about = "Publish, copy or delete a whole environment")]
    Migrate(MigrateArgs),
}

#[derive(Debug, Args)]
struct InitArgs {
    #[arg(long, help = "Overwrite an existing config file")]
    force: bool,
}

#[derive(Debug, Args)]
struct AnalyzeArgs {
    target: String,
    #[arg(long, help = "Treat an edit URL as the creation of a new page")]
    new_page: bool,
    #[arg(long, help = "Print the parsed address as JSON")]
    json: bool,
}

#[derive(Debug, Args)]
struct RewriteArgs {
    #[arg(long, value_name = "PREFIX")]
    from: String,
    #[arg(long, value_name = "PREFIX")]
    to: String,
    #[arg(long, help = "Treat --from as a regular expression")]
    regex: bool,
    #[arg(long, value_name = "FILE", help = "Read wikitext from FILE instead of stdin")]
    input: Option<PathBuf>,
}

#[derive(Debug, Args)]
struct MergeArgs {
    #[arg(long, value_name = "FILE", help = "Omit together with --ancestor for a new page")]
    current: Option<PathBuf>,
    #[arg(long, value_name = "FILE")]
    ancestor: Option<PathBuf>,
    #[arg(long, value_name = "FILE")]
    incoming: PathBuf,
    #[arg(long, value_name = "FILE")]
    output: Option<PathBuf>,
}

#[derive(Debug, Args)]
struct IssuesArgs {
    title: String,
}

#[derive(Debug, Args)]
struct IntegrateArgs {
    target: String,
    #[arg(long, value_name = "ID", help = "Issue to merge; defaults to the URL's merge_issue")]
    issue: Option<String>,
    #[arg(long, help = "The target page does not exist yet")]
    new_page: bool,
    #[arg(long, value_name = "FILE", help = "Write the merged text to FILE")]
    output: Option<PathBuf>,
    #[arg(long, help = "Save the result to the wiki")]
    apply: bool,
    #[arg(long, value_name = "FILE", help = "Save this text instead of the merged text")]
    accepted: Option<PathBuf>,
    #[arg(long, value_name = "TEXT")]
    summary: Option<String>,
    #[arg(long, help = "Save even when the summary check fails")]
    force_summary: bool,
}

#[derive(Debug, Args)]
struct BranchIssueArgs {
    #[arg(help = "Production page title, or the edit URL of a new issue page")]
    target: String,
    #[arg(long, value_name = "ID", help = "Issue id (required with a production title)")]
    issue: Option<String>,
    #[arg(long, value_name = "TITLE", help = "Start an empty page with this stem")]
    blank: Option<String>,
    #[arg(long, value_name = "URL")]
    issue_url: Option<String>,
}

#[derive(Debug, Args)]
struct TargetsArgs {
    issue_title: String,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum MigrateAction {
    Publish,
    CreatePrepub,
    Duplicate,
    Delete,
}

impl From<MigrateAction> for MigrationAction {
    fn from(action: MigrateAction) -> Self {
        match action {
            MigrateAction::Publish => Self::Publish,
            MigrateAction::CreatePrepub => Self::CreatePrepub,
            MigrateAction::Duplicate => Self::Duplicate,
            MigrateAction::Delete => Self::Delete,
        }
    }
}

#[derive(Debug, Args)]
struct MigrateArgs {
    #[arg(value_enum)]
    action: MigrateAction,
    #[arg(long, value_name = "PREFIX")]
    source: String,
    #[arg(long, value_name = "PREFIX", help = "Only used by duplicate")]
    target: Option<String>,
    #[arg(long, value_name = "TITLE", help = "Leave pairs involving TITLE alone")]
    exclude: Vec<String>,
    #[arg(long, help = "Run the action; without it only the plan is printed")]
    yes: bool,
    #[arg(long, help = "Print the final pair states as JSON")]
    json: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    let runtime = RuntimeOptions::from_cli(&cli);

    match cli.command {
        Some(Commands::Init(args)) => run_init(&runtime, args),
        Some(Commands::Analyze(args)) => run_analyze(args),
        Some(Commands::Rewrite(args)) => run_rewrite(args),
        Some(Commands::Merge(args)) => run_merge(args),
        Some(Commands::Issues(args)) => run_issues(&runtime, args),
        Some(Commands::Integrate(args)) => run_integrate(&runtime, args),
        Some(Commands::BranchIssue(args)) => run_branch_issue(&runtime, args),
        Some(Commands::Targets(args)) => run_targets(&runtime, args),
        Some(Commands::Migrate(args)) => run_migrate(&runtime, args),
        None => {
            let mut command = Cli::command();
            command.print_help()?;
            println!();
            Ok(())
        }
    }
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_env("WIKIFLOW_LOG").unwrap_or_else(|_| EnvFilter::new("info"))
    };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .try_init();
}

fn run_init(runtime: &RuntimeOptions, args: InitArgs) -> Result<()> {
    let paths = resolve_runtime_paths(runtime)?;
    let report = init_layout(&paths, &InitOptions { force: args.force })?;

    println!("Initialized wikiflow runtime layout");
    println!("project_root: {}", normalize_path(&paths.project_root));
    println!("state_dir: {}", normalize_path(&paths.state_dir));
    println!("config_path: {}", normalize_path(&paths.config_path));
    println!("created_dirs: {}", report.created_dirs.len());
    println!("wrote_config: {}", report.wrote_config);
    if !report.wrote_config {
        println!("note: config already exists (use --force to overwrite)");
    }
    print_diagnostics(runtime, &paths);
    Ok(())
}

fn run_analyze(args: AnalyzeArgs) -> Result<()> {
    let target = args.target.trim();
    let url = if is_url(target) {
        parse_url(target, args.new_page)
            .with_context(|| format!("`{target}` is not a wiki read or edit URL for an environment page"))?
    } else {
        let kind = if args.new_page {
            RequestKind::Create
        } else {
            RequestKind::Read
        };
        UrlAddress::from_title(target, kind)
            .with_context(|| format!("`{target}` does not follow the environment naming convention"))?
    };
    if args.json {
        println!("{}", serde_json::to_string_pretty(&url)?);
        return Ok(());
    }
    let address = &url.address;
    let namespace = address.namespace();

    println!("title: {}", address.full_title());
    println!("realm: {}", address.realm());
    println!("namespace: {}", format_optional(Some(namespace.as_str())));
    println!("version: {}", format_optional(address.version()));
    println!("issue_id: {}", format_optional(address.issue_id()));
    println!("separator: {}", address.separator());
    println!("stem: {}", address.title());
    println!("kind: {}", url.kind.as_str());
    for (key, value) in &url.params {
        println!("param.{key}: {value}");
    }
    Ok(())
}

fn run_rewrite(args: RewriteArgs) -> Result<()> {
    let text = match &args.input {
        Some(path) => read_text(path)?,
        None => io::read_to_string(io::stdin()).context("failed to read wikitext from stdin")?,
    };
    let rule = if args.regex {
        PrefixRule::regex(args.from.clone(), args.to.clone())
    } else {
        PrefixRule::literal(args.from.clone(), args.to.clone())
    };
    let rewriter = rule.compile()?;
    let rewritten = rewriter.rewrite(&text);
    if rewriter.contains_from(&rewritten) {
        warn!(prefix = %args.from, "text still mentions the old prefix outside links");
    }
    print!("{rewritten}");
    Ok(())
}

fn run_merge(args: MergeArgs) -> Result<()> {
    let current = args.current.as_deref().map(read_text).transpose()?;
    let ancestor = args.ancestor.as_deref().map(read_text).transpose()?;
    let incoming = read_text(&args.incoming)?;

    let outcome = merge(current.as_deref(), ancestor.as_deref(), &incoming);
    match &args.output {
        Some(path) => {
            write_text(path, &outcome.merged_text)?;
            println!("output: {}", normalize_path(path));
        }
        None => print!("{}", outcome.merged_text),
    }
    eprintln!("has_conflicts: {}", outcome.has_conflicts);
    for conflict in &outcome.conflicts {
        eprintln!(
            "conflict.ancestor_range: {}..{}",
            conflict.ancestor_range.start, conflict.ancestor_range.end
        );
    }
    Ok(())
}

fn run_issues(runtime: &RuntimeOptions, args: IssuesArgs) -> Result<()> {
    let (paths, config) = load_runtime(runtime)?;
    let client = build_client(&config)?;
    let page = UrlAddress::from_title(&args.title, RequestKind::Edit)
        .with_context(|| format!("`{}` does not follow the environment naming convention", args.title))?;
    let integrator = IssueIntegrator::new(&client, page, None, IntegratorOptions::from_config(&config))?;
    let issues = integrator.list_candidate_issues()?;

    println!("page: {}", integrator.page().address);
    println!("issues.count: {}", issues.len());
    if issues.is_empty() {
        println!("issues: <none>");
    }
    for issue in &issues {
        println!("issues.id: {issue}");
    }
    println!("requests: {}", client.request_count());
    print_diagnostics(runtime, &paths);
    Ok(())
}

fn run_integrate(runtime: &RuntimeOptions, args: IntegrateArgs) -> Result<()> {
    let (paths, config) = load_runtime(runtime)?;
    let client = build_client(&config)?;
    let target = args.target.trim();
    let page = if is_url(target) {
        parse_url(target, args.new_page)
            .with_context(|| format!("`{target}` is not an edit URL for an environment page"))?
    } else {
        let kind = if args.new_page {
            RequestKind::Create
        } else {
            RequestKind::Edit
        };
        UrlAddress::from_title(target, kind)
            .with_context(|| format!("`{target}` does not follow the environment naming convention"))?
    };
    let issue_id = args
        .issue
        .clone()
        .or_else(|| page.merge_issue().map(str::to_string))
        .context("no issue given (use --issue or a URL with merge_issue)")?;

    let mut integrator =
        IssueIntegrator::load(&client, page, IntegratorOptions::from_config(&config))?;
    let state = integrator.select_issue(&issue_id)?.clone();
    let merged_text = state.merged_text().to_string();
    let has_conflicts = state.has_conflicts();

    println!("page: {}", integrator.page().address);
    println!("kind: {}", integrator.page().kind.as_str());
    println!("issue: {} ({})", state.issue_id, state.issue_title);
    println!("has_conflicts: {has_conflicts}");
    for conflict in &state.outcome.conflicts {
        println!(
            "conflict.ancestor_range: {}..{}",
            conflict.ancestor_range.start, conflict.ancestor_range.end
        );
    }
    if let Some(path) = &args.output {
        write_text(path, &merged_text)?;
        println!("output: {}", normalize_path(path));
    }

    if args.apply {
        let summary = args
            .summary
            .as_deref()
            .context("--apply requires --summary")?;
        let accepted = match &args.accepted {
            Some(path) => read_text(path)?,
            None if has_conflicts => bail!(
                "the merge has conflicts; resolve them in a copy of the merged text and pass it with --accepted"
            ),
            None => merged_text,
        };
        let check = integrator.check_summary(summary);
        if check != SummaryCheck::Accepted {
            println!("summary_check: {check}");
        }
        let applied = integrator.apply_merge_result(&accepted, summary, args.force_summary)?;
        println!("saved: {} (page id {})", applied.title, applied.page_id);
        println!("created: {}", applied.created);
    } else if args.output.is_none() {
        println!("merged_text:");
        print!("{merged_text}");
    }
    println!("requests: {}", client.request_count());
    print_diagnostics(runtime, &paths);
    Ok(())
}

fn run_branch_issue(runtime: &RuntimeOptions, args: BranchIssueArgs) -> Result<()> {
    let (paths, config) = load_runtime(runtime)?;
    let plan = if is_url(&args.target) {
        let url = parse_url(&args.target, true)
            .with_context(|| format!("`{}` is not an issue page edit URL", args.target))?;
        IssueBranchPlan::from_url(&url)?
    } else {
        let production = parse_title(&args.target).with_context(|| {
            format!(
                "`{}` does not follow the environment naming convention",
                args.target
            )
        })?;
        let issue = args
            .issue
            .as_deref()
            .context("--issue is required with a production title")?;
        IssueBranchPlan::for_production_page(
            &production,
            issue,
            args.blank.as_deref(),
            args.issue_url.as_deref(),
        )?
    };
    let client = build_client(&config)?;
    let branched = branch_issue(&client, &plan, &config.issue_banner_template())?;

    println!("issue_page: {}", branched.title);
    println!("page_id: {}", branched.page_id);
    println!("source: {}", plan.source);
    println!("cloned: {}", plan.clone_source);
    println!("summary: {}", branched.summary);
    if let Some(url) = config.page_url(&branched.title) {
        println!("url: {url}");
    }
    if let Some(url) = config
        .wiki_url()
        .and_then(|wiki_url| plan.edit_url(&wiki_url))
    {
        println!("edit_url: {url}");
    }
    print_diagnostics(runtime, &paths);
    Ok(())
}

fn run_targets(runtime: &RuntimeOptions, args: TargetsArgs) -> Result<()> {
    let (paths, config) = load_runtime(runtime)?;
    let issue = parse_title(&args.issue_title).with_context(|| {
        format!(
            "`{}` does not follow the environment naming convention",
            args.issue_title
        )
    })?;
    let client = build_client(&config)?;
    let targets = list_integration_targets(&client, &issue, config.search_limit())?;
    let issue_id = issue.issue_id().unwrap_or_default();
    let wiki_url = config.wiki_url().unwrap_or_default();

    println!("issue: {issue}");
    println!("targets.count: {}", targets.len());
    for target in &targets {
        let merge_url = target
            .merge_url(issue_id, &wiki_url)
            .map(|url| url.to_string());
        println!(
            "target.{}: {} ({}) {}",
            target.version,
            target.title,
            if target.page_exists { "exists" } else { "new page" },
            format_optional(merge_url.as_deref())
        );
    }
    print_diagnostics(runtime, &paths);
    Ok(())
}

fn run_migrate(runtime: &RuntimeOptions, args: MigrateArgs) -> Result<()> {
    let (paths, config) = load_runtime(runtime)?;
    let action = MigrationAction::from(args.action);
    let plan = MigrationPlan::new(action, &args.source, args.target.as_deref())?;
    let client = build_client(&config)?;
    let mut pairs = collect_pairs(&client, &plan, config.search_limit())?;
    let active = active_flags(&pairs, &args.exclude);

    println!("action: {action}");
    println!("source_prefix: {}", plan.source_prefix());
    println!(
        "target_prefix: {}",
        format_optional(plan.target_prefix())
    );
    println!("pairs.count: {}", pairs.len());
    for (index, pair) in pairs.iter().enumerate() {
        let marker = if active[index] { "+" } else { "-" };
        println!("pair.{index}: {marker} {}", pair.describe(action));
    }

    if !args.yes {
        println!("dry run: pass --yes to run the action");
        print_diagnostics(runtime, &paths);
        return Ok(());
    }

    let summary = perform_action(
        &client,
        &plan,
        &mut pairs,
        &active,
        config.max_parallel(),
        |index, pair| print_pair_outcome(index, pair),
    )?;
    println!("succeeded: {}", summary.succeeded);
    println!("failed: {}", summary.failed);
    println!("skipped: {}", summary.skipped);
    println!("requests: {}", client.request_count());
    if args.json {
        println!("{}", serde_json::to_string_pretty(&pairs)?);
    }
    print_diagnostics(runtime, &paths);
    if summary.failed > 0 {
        bail!("{} of the selected pairs failed", summary.failed);
    }
    Ok(())
}

fn print_pair_outcome(index: usize, pair: &PagePair) {
    let name = pair
        .source_title()
        .or(pair.target_title())
        .unwrap_or_default();
    let mut steps = Vec::new();
    if pair.target_deleted {
        steps.push("target deleted");
    }
    if pair.source_duplicated {
        steps.push("duplicated");
    }
    if pair.target_rewritten {
        steps.push("links rewritten");
    }
    if pair.source_deleted {
        steps.push("deleted");
    }
    match &pair.failure {
        Some(failure) => println!(
            "result.{index}: FAILED {name} at {}: {} [{}]",
            failure.step,
            failure.message,
            steps.join(", ")
        ),
        None => println!("result.{index}: ok {name} [{}]", steps.join(", ")),
    }
    if pair.contains_leftover_prefix {
        println!("result.{index}: warning: page still mentions the source prefix");
    }
}

fn load_runtime(runtime: &RuntimeOptions) -> Result<(ResolvedPaths, WikiflowConfig)> {
    let paths = resolve_runtime_paths(runtime)?;
    let status = inspect_runtime(&paths);
    for warning in &status.warnings {
        warn!("{warning}");
    }
    let config = load_config(&paths.config_path)?;
    Ok((paths, config))
}

fn build_client(config: &WikiflowConfig) -> Result<MediaWikiClient> {
    MediaWikiClient::new(MediaWikiClientConfig::from_config(config))
        .context("failed to set up the wiki client")
}

fn resolve_runtime_paths(runtime: &RuntimeOptions) -> Result<ResolvedPaths> {
    dotenvy::dotenv().ok();

    let context = ResolutionContext::from_process()?;
    let overrides = PathOverrides {
        project_root: runtime.project_root.clone(),
        config: runtime.config.clone(),
    };

    let initial = resolve_paths(&context, &overrides)?;
    let project_env = initial.project_root.join(".env");
    if project_env.exists() {
        let _ = dotenvy::from_path_override(&project_env);
    }

    resolve_paths(&context, &overrides)
}

fn print_diagnostics(runtime: &RuntimeOptions, paths: &ResolvedPaths) {
    if runtime.diagnostics {
        println!("\n[diagnostics]\n{}", paths.diagnostics());
    }
}

fn read_text(path: &Path) -> Result<String> {
    fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))
}

fn write_text(path: &Path, content: &str) -> Result<()> {
    fs::write(path, content).with_context(|| format!("failed to write {}", path.display()))
}

fn is_url(value: &str) -> bool {
    value.starts_with("http://") || value.starts_with("https://")
}

fn normalize_path(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

fn format_optional(value: Option<&str>) -> &str {
    match value {
        Some(value) if !value.is_empty() => value,
        _ => "<none>",
    }
}
