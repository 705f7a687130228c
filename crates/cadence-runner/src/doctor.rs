use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use tracing::info;

use cadence_velero::exec::run;

use crate::Config;

const CHECK_TIMEOUT: Duration = Duration::from_secs(30);

/// Check the config and that both CLIs are usable. Returns one line per passed check.
pub fn doctor(cfg: &Config) -> Result<Vec<String>> {
    let mut ok = Vec::new();
    cfg.validate().context("config")?;
    let timeline = cfg.timeline()?;
    ok.push(format!(
        "config: period {} x {} checks, worst case {}s of a {}s deadline",
        timeline.period,
        timeline.verify_times,
        timeline.worst_case_duration().as_secs(),
        cfg.deadline().as_secs()
    ));

    let velero = &cfg.platform.velero_bin;
    let out = run(velero, &["version".to_string(), "--client-only".to_string()], CHECK_TIMEOUT)
        .map_err(|e| anyhow!("{velero} not usable; install velero or set platform.velero_bin: {e:#}"))?;
    ok.push(format!("velero: {}", first_line(&out)));

    let kubectl = &cfg.platform.kubectl_bin;
    let out = run(kubectl, &["version".to_string(), "--client".to_string()], CHECK_TIMEOUT)
        .map_err(|e| anyhow!("{kubectl} not usable; install kubectl or set platform.kubectl_bin: {e:#}"))?;
    ok.push(format!("kubectl: {}", first_line(&out)));

    if let Some(kc) = cfg.velero_settings().kubeconfig {
        if !kc.exists() {
            return Err(anyhow!("kubeconfig {} does not exist", kc.display()));
        }
        ok.push(format!("kubeconfig: {}", kc.display()));
    }
    for line in &ok {
        info!("doctor: {line}");
    }
    Ok(ok)
}

fn first_line(s: &str) -> &str {
    s.lines().next().unwrap_or("").trim()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_config_is_reported_first() {
        let mut cfg = Config::default_config();
        cfg.run.verify_times = 0;
        let err = doctor(&cfg).unwrap_err();
        assert!(format!("{err:#}").starts_with("config"));
    }

    #[test]
    fn missing_binary_names_the_setting() {
        let mut cfg = Config::default_config();
        cfg.platform.velero_bin = "/nonexistent/velero".into();
        let err = doctor(&cfg).unwrap_err();
        assert!(err.to_string().contains("platform.velero_bin"));
    }

    #[test]
    fn stand_in_binaries_pass_the_tool_checks() {
        let mut cfg = Config::default_config();
        cfg.platform.velero_bin = "echo".into();
        cfg.platform.kubectl_bin = "echo".into();
        let lines = doctor(&cfg).unwrap();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[1], "velero: version --client-only");
    }
}
