use std::path::PathBuf;
use std::sync::Arc;

use tracing::{info, warn};

use payrace::config::{self, PayraceConfig, TargetConfig};
use payrace::errors::PayraceError;
use payrace::http::{ReqwestTransport, TransportOptions};
use payrace::models::{Endpoint, Session};
use payrace::scan::{ScanEngine, ScanReport};
use payrace::utils::format_duration;

use crate::cli::commands::ScanArgs;

pub async fn handle_scan(args: ScanArgs, quiet: bool) -> Result<(), PayraceError> {
    let file_config = match &args.config {
        Some(path) => config::parse_config(&PathBuf::from(path)).await?,
        None => PayraceConfig::default(),
    };
    let config = apply_overrides(file_config, &args)?;
    config::validate_semantics(&config)?;

    let endpoints = config.endpoints();
    if endpoints.is_empty() {
        return Err(PayraceError::Config(
            "No endpoints to test: pass --target or set target.endpoints".into(),
        ));
    }

    let race = config.race();
    let transport = ReqwestTransport::new(&TransportOptions {
        timeout: race.request_timeout(),
        body_limit: race.body_preview_bytes,
        ..TransportOptions::default()
    })?;

    let engine = ScanEngine::new(Arc::new(transport), &config);
    let cancel = engine.cancel_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, cancelling scan");
            cancel.cancel();
        }
    });

    let session = config.session.clone().unwrap_or_default();
    let report = engine.run(&endpoints, &session).await;

    if !quiet {
        print_summary(&report);
    }
    write_report(&report, args.output.as_deref()).await
}

fn apply_overrides(mut config: PayraceConfig, args: &ScanArgs) -> Result<PayraceConfig, PayraceError> {
    if !args.targets.is_empty() {
        let target = config.target.get_or_insert_with(TargetConfig::default);
        for url in &args.targets {
            target
                .endpoints
                .push(Endpoint::new(url, &args.method).with_source("cli"));
        }
    }

    if let Some(concurrency) = args.concurrency {
        let mut race = config.race();
        race.concurrency = concurrency;
        config.race = Some(race);
    }

    if args.dry_run || args.all_endpoints {
        let mut scan = config.scan();
        scan.dry_run |= args.dry_run;
        if args.all_endpoints {
            scan.payment_only = false;
        }
        config.scan = Some(scan);
    }

    if args.cookie.is_some() || args.token.is_some() || !args.headers.is_empty() {
        let session = config.session.get_or_insert_with(Session::default);
        if let Some(cookie) = &args.cookie {
            for pair in cookie.split(';') {
                if let Some((name, value)) = pair.trim().split_once('=') {
                    session.cookies.insert(name.trim().to_string(), value.trim().to_string());
                }
            }
        }
        if let Some(token) = &args.token {
            session.session_token = Some(token.clone());
        }
        for header in &args.headers {
            let (name, value) = header
                .split_once(':')
                .ok_or_else(|| PayraceError::Config(format!("Invalid header '{}', expected 'Name: value'", header)))?;
            session.headers.insert(name.trim().to_string(), value.trim().to_string());
        }
    }

    Ok(config)
}

fn print_summary(report: &ScanReport) {
    let counts = &report.severity_counts;
    eprintln!();
    let elapsed = (report.finished_at - report.started_at).num_milliseconds().max(0) as u64;
    eprintln!("Scan {} ({})", report.scan_id, format_duration(elapsed));
    if report.dry_run {
        eprintln!("  Dry run: no requests were sent");
    }
    eprintln!(
        "  Endpoints tested: {}  skipped: {}{}",
        report.endpoints_tested,
        report.endpoints_skipped,
        if report.cancelled { "  (cancelled)" } else { "" }
    );
    eprintln!(
        "  Findings: {} (critical {}, high {}, medium {}, low {})",
        counts.total(),
        counts.critical,
        counts.high,
        counts.medium,
        counts.low
    );
    for finding in &report.findings {
        eprintln!("  [{}] {} - {}", finding.severity, finding.title, finding.endpoint);
    }

    if !report.diagnostics.is_empty() {
        eprintln!("  Diagnostics:");
        for (endpoint, d) in &report.diagnostics {
            let failures: Vec<String> = d.failures.iter().map(|(k, n)| format!("{}={}", k, n)).collect();
            eprintln!(
                "    {}: sent {}, received {}, failures [{}]{}{}",
                endpoint,
                d.requests_sent,
                d.results_received,
                failures.join(", "),
                if d.timed_out { ", timed out" } else { "" },
                if d.cancelled { ", cancelled" } else { "" },
            );
        }
    }
}

async fn write_report(report: &ScanReport, output: Option<&str>) -> Result<(), PayraceError> {
    let json = serde_json::to_string_pretty(report)?;
    match output {
        Some(path) => {
            tokio::fs::write(path, json).await?;
            info!(path = %path, "Report written");
        }
        None => println!("{}", json),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args() -> ScanArgs {
        ScanArgs {
            config: None,
            targets: vec!["https://shop.test/api/pay".into()],
            method: "post".into(),
            concurrency: Some(25),
            cookie: Some("sid=abc; csrf = xyz".into()),
            token: Some("tok".into()),
            headers: vec!["X-Tenant: t1".into()],
            all_endpoints: true,
            dry_run: true,
            output: None,
        }
    }

    #[test]
    fn test_overrides_applied() {
        let config = apply_overrides(PayraceConfig::default(), &args()).unwrap();
        let endpoints = config.endpoints();
        assert_eq!(endpoints.len(), 1);
        assert_eq!(endpoints[0].method, "POST");
        assert_eq!(endpoints[0].source, "cli");
        assert_eq!(config.race().concurrency, 25);
        assert!(config.scan().dry_run);
        assert!(!config.scan().payment_only);

        let session = config.session.unwrap();
        assert_eq!(session.cookies.get("csrf").map(String::as_str), Some("xyz"));
        assert_eq!(session.headers.get("X-Tenant").map(String::as_str), Some("t1"));
        assert_eq!(session.session_token.as_deref(), Some("tok"));
    }

    #[test]
    fn test_bad_header_rejected() {
        let mut a = args();
        a.headers = vec!["no-colon".into()];
        assert!(matches!(apply_overrides(PayraceConfig::default(), &a), Err(PayraceError::Config(_))));
    }
}
