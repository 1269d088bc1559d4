use clap::Parser;
use safe_codegen::core::AuditSink;
use safe_codegen::utils::{logger, validation::Validate};
use safe_codegen::{
    ChatCompletionsClient, CliArgs, CodegenConfig, CodegenError, ContentScanner, FileAuditSink,
    PromptTemplate, SafeFileWriter, TaskList, TaskRunner, TaskStatus, TracingAuditSink,
};
use std::sync::Arc;

/// 致命錯誤：輸出說明後結束程式
fn fail(e: CodegenError) -> ! {
    tracing::error!(
        "❌ {} (Category: {:?}, Severity: {:?})",
        e,
        e.category(),
        e.severity()
    );
    tracing::error!("💡 Suggestion: {}", e.recovery_suggestion());
    eprintln!("❌ {}", e.user_friendly_message());
    eprintln!("💡 {}", e.recovery_suggestion());
    std::process::exit(1);
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = CliArgs::parse();

    // 初始化日誌
    if args.json_logs {
        logger::init_json_logger(args.verbose);
    } else {
        logger::init_cli_logger(args.verbose);
    }

    tracing::info!("🚀 Starting safe-codegen");
    tracing::info!("📁 Loading configuration from: {}", args.config);

    let mut config = CodegenConfig::from_file(&args.config).unwrap_or_else(|e| fail(e));
    args.apply_overrides(&mut config);

    // 驗證配置
    if let Err(e) = config.validate() {
        fail(e);
    }
    let task_list = config.tasks().unwrap_or_else(|e| fail(e));

    tracing::info!("✅ Configuration loaded and validated successfully");
    display_config_summary(&config, &task_list, &args);

    let audit: Arc<dyn AuditSink> = match config.security.audit_log_path() {
        Some(path) => Arc::new(FileAuditSink::open(path).unwrap_or_else(|e| fail(e))),
        None => Arc::new(TracingAuditSink),
    };
    let scanner = ContentScanner::from_patterns(&config.security.forbidden_patterns)
        .unwrap_or_else(|e| fail(e));
    let writer = SafeFileWriter::new(
        &config.output.directory,
        config.security.write_policy(),
        scanner,
        audit.clone(),
    )
    .unwrap_or_else(|e| fail(e));

    if args.dry_run {
        tracing::info!("🔍 DRY RUN MODE - No API calls or writes will occur");
        perform_dry_run(&writer, &task_list);
        return Ok(());
    }

    let client = ChatCompletionsClient::from_config(&config.assistant).unwrap_or_else(|e| fail(e));
    let runner = TaskRunner::new(client, writer, audit)
        .with_prompt_template(PromptTemplate::new(config.assistant.prompt_template.clone()));

    let report = runner.run(&task_list.tasks).await;

    for outcome in &report.outcomes {
        match &outcome.status {
            TaskStatus::Written { path, bytes, .. } => {
                println!("✅ {} -> {} ({} bytes)", outcome.filename, path.display(), bytes)
            }
            TaskStatus::GenerationFailed { transient, message } => println!(
                "❌ {}: generation failed{}: {}",
                outcome.filename,
                if *transient { " (transient)" } else { "" },
                message
            ),
            TaskStatus::Rejected { reason, detail } => {
                println!("⛔ {}: {} - {}", outcome.filename, reason, detail)
            }
            TaskStatus::IoFailed { detail } => println!("❌ {}: {}", outcome.filename, detail),
        }
    }

    println!();
    println!(
        "📊 {} succeeded, {} failed, {} config entries skipped",
        report.succeeded(),
        report.failed(),
        task_list.skipped.len()
    );
    if args.verbose {
        println!("{}", serde_json::to_string_pretty(&report.summary())?);
    }

    if !report.all_succeeded() {
        std::process::exit(2);
    }

    Ok(())
}

fn display_config_summary(config: &CodegenConfig, task_list: &TaskList, args: &CliArgs) {
    println!("📋 Configuration Summary:");
    println!("  Assistant: {} ({})", config.assistant.model, config.assistant.base_url);
    println!("  Output: {}", config.output.directory);
    println!("  Max File Size: {} bytes", config.security.max_file_size);
    if config.security.allowed_extensions.is_empty() {
        println!("  Extensions: any");
    } else {
        println!("  Extensions: {}", config.security.allowed_extensions.join(", "));
    }
    println!(
        "  Content Rules: {}",
        config.security.forbidden_patterns.len()
    );
    println!(
        "  Tasks: {} ({} skipped)",
        task_list.tasks.len(),
        task_list.skipped.len()
    );

    if args.dry_run {
        println!("  🔍 DRY RUN MODE ENABLED");
    }

    println!();
}

fn perform_dry_run(writer: &SafeFileWriter, task_list: &TaskList) {
    println!("🔍 Dry Run Analysis:");
    println!();

    for (i, task) in task_list.tasks.iter().enumerate() {
        match writer.resolve_target(&task.filename) {
            Ok(target) => println!("  {}. ✅ {} -> {}", i + 1, task.filename, target.display()),
            Err(e) => println!("  {}. ⛔ {} ({}): {}", i + 1, task.filename, e.reason(), e),
        }
        println!("     {}", task.description);
    }

    for skipped in &task_list.skipped {
        println!("  ⏭️ Entry #{} skipped: {}", skipped.position, skipped.reason);
    }

    println!();
    println!("✅ Dry run analysis complete.");
}
