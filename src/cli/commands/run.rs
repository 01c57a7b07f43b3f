//! Run command - replay a session scenario

use crate::audit::AuditLog;
use crate::cli::args::{OutputFormat, RunArgs};
use crate::config::Config;
use crate::error::{TokenError, TokenResult};
use crate::scenario::{Scenario, StepReport};
use crate::token::Token;
use console::style;

/// Execute the run command
pub async fn execute(args: RunArgs, config: &Config) -> TokenResult<()> {
    let scenario = Scenario::load(&args.scenario).await?;
    let token: Token = Token::from_config(&config.token)?.with_audit(AuditLog::new(config));

    let reports = scenario.replay(&token, args.fail_fast);

    match args.format {
        OutputFormat::Table => print_table(&token, &reports),
        OutputFormat::Json => print_json(&reports)?,
    }

    let failed = reports.iter().filter(|r| !r.ok()).count();
    if args.fail_fast && failed > 0 {
        return Err(TokenError::Internal(format!(
            "scenario {} stopped at a failing step",
            args.scenario.display()
        )));
    }

    Ok(())
}

fn print_table(token: &Token, reports: &[StepReport]) {
    println!(
        "{} {}",
        style("Token").bold(),
        style(&token.info().label).cyan()
    );
    println!(
        "{:<4} {:<22} {:<7} {:<6} {:<5} {:<5} {:<5} {:<10} {}",
        style("#").bold(),
        style("STEP").bold(),
        style("HANDLE").bold(),
        style("STATE").bold(),
        style("ALL").bold(),
        style("RW").bold(),
        style("RO").bold(),
        style("LOGIN").bold(),
        style("RESULT").bold()
    );
    println!("{}", "-".repeat(80));

    for report in reports {
        let handle = report
            .handle
            .map(|h| h.to_string())
            .unwrap_or_else(|| "-".to_string());
        let state = report
            .ck_state
            .map(|s| s.to_string())
            .unwrap_or_else(|| "-".to_string());
        let login = report
            .login
            .user
            .map(|u| u.to_string())
            .unwrap_or_else(|| "-".to_string());
        let result = match &report.error {
            None => style("ok".to_string()).green(),
            Some(e) => style(format!("{} (rv {:#06x})", e, report.rv)).red(),
        };

        println!(
            "{:<4} {:<22} {:<7} {:<6} {:<5} {:<5} {:<5} {:<10} {}",
            report.index,
            report.step,
            handle,
            state,
            report.counts.all,
            report.counts.rw,
            report.counts.ro,
            login,
            result
        );
    }

    println!();
    let failed = reports.iter().filter(|r| !r.ok()).count();
    println!("{} step(s), {} failed", reports.len(), failed);
}

fn print_json(reports: &[StepReport]) -> TokenResult<()> {
    let json = serde_json::to_string_pretty(reports)?;
    println!("{}", json);
    Ok(())
}
