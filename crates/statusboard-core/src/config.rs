use std::collections::HashMap;
use std::fs;
use std::path::{
  Path,
  PathBuf
};
use std::time::Duration;

use anyhow::{
  Context,
  anyhow
};
use tracing::{
  debug,
  info,
  trace,
  warn
};

use crate::adapter::DEFAULT_TIMEOUT;
use crate::batch::DEFAULT_DEBOUNCE;
use crate::undo::DEFAULT_CAPACITY;

pub const RC_ENV: &str = "STATUSBOARDRC";

#[derive(Debug, Clone)]
pub struct Config {
  map:              HashMap<String, String>,
  pub loaded_files: Vec<PathBuf>
}

/// Typed view of the keys the
/// coordinator and session care about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
  pub undo_capacity:    usize,
  pub reorder_debounce: Duration,
  pub remote_timeout:   Duration,
  pub demo_latency:     Duration
}

impl Default for Settings {
  fn default() -> Self {
    Self {
      undo_capacity:    DEFAULT_CAPACITY,
      reorder_debounce: DEFAULT_DEBOUNCE,
      remote_timeout:   DEFAULT_TIMEOUT,
      demo_latency:     Duration::from_millis(
        300
      )
    }
  }
}

impl Config {
  /// Built-in defaults only, no file.
  pub fn defaults() -> Self {
    let mut cfg = Config {
      map:          HashMap::new(),
      loaded_files: vec![]
    };

    for (k, v) in [
      (
        "data.location",
        "~/.local/share/statusboard"
      ),
      ("undo.capacity", "15"),
      ("reorder.debounce_ms", "500"),
      ("remote.timeout_secs", "10"),
      ("demo.latency_ms", "300"),
      ("color", "on")
    ] {
      cfg
        .map
        .insert(k.to_string(), v.to_string());
    }
    cfg
  }

  #[tracing::instrument(skip(
    rc_override
  ))]
  pub fn load(
    rc_override: Option<&Path>
  ) -> anyhow::Result<Self> {
    let mut cfg = Self::defaults();

    let rc = resolve_rc_path(rc_override)?;
    if let Some(path) = rc {
      info!(rc = %path.display(), "loading statusboardrc");
      cfg.load_file(&path)?;
    } else {
      warn!(
        "no statusboardrc found; using \
         defaults"
      );
    }

    Ok(cfg)
  }

  #[tracing::instrument(skip(
    self, overrides
  ))]
  pub fn apply_overrides<I>(
    &mut self,
    overrides: I
  ) where
    I: IntoIterator<
      Item = (String, String)
    >
  {
    for (k, v) in overrides {
      let key = k
        .strip_prefix("rc.")
        .unwrap_or(&k)
        .to_string();
      debug!(key = %key, value = %v, "applying override");
      self.map.insert(key, v);
    }
  }

  pub fn get(
    &self,
    key: &str
  ) -> Option<String> {
    self.map.get(key).cloned()
  }

  pub fn get_bool(
    &self,
    key: &str
  ) -> Option<bool> {
    self
      .map
      .get(key)
      .map(|v| parse_bool(v))
  }

  pub fn get_u64(
    &self,
    key: &str
  ) -> anyhow::Result<Option<u64>> {
    self
      .map
      .get(key)
      .map(|raw| {
        raw.trim().parse::<u64>().with_context(
          || {
            format!(
              "invalid number for {key}: \
               {raw}"
            )
          }
        )
      })
      .transpose()
  }

  #[tracing::instrument(skip(self))]
  pub fn settings(
    &self
  ) -> anyhow::Result<Settings> {
    let defaults = Settings::default();

    let undo_capacity = match self
      .get_u64("undo.capacity")?
    {
      | Some(0) => {
        return Err(anyhow!(
          "undo.capacity must be at \
           least 1"
        ));
      }
      | Some(n) => usize::try_from(n)
        .context("undo.capacity is too large")?,
      | None => defaults.undo_capacity
    };

    let reorder_debounce = self
      .get_u64("reorder.debounce_ms")?
      .map(Duration::from_millis)
      .unwrap_or(defaults.reorder_debounce);

    let remote_timeout = match self
      .get_u64("remote.timeout_secs")?
    {
      | Some(0) => {
        return Err(anyhow!(
          "remote.timeout_secs must be \
           positive"
        ));
      }
      | Some(secs) => {
        Duration::from_secs(secs)
      }
      | None => defaults.remote_timeout
    };

    let demo_latency = self
      .get_u64("demo.latency_ms")?
      .map(Duration::from_millis)
      .unwrap_or(defaults.demo_latency);

    let settings = Settings {
      undo_capacity,
      reorder_debounce,
      remote_timeout,
      demo_latency
    };
    debug!(?settings, "resolved settings");
    Ok(settings)
  }

  #[tracing::instrument(skip(self))]
  fn load_file(
    &mut self,
    path: &Path
  ) -> anyhow::Result<()> {
    let path = expand_tilde(path);
    let text =
      fs::read_to_string(&path)
        .with_context(|| {
          format!(
            "failed to read {}",
            path.display()
          )
        })?;

    self
      .loaded_files
      .push(path.clone());

    let base_dir = path
      .parent()
      .map(|p| p.to_path_buf())
      .unwrap_or_else(|| {
        PathBuf::from(".")
      });

    for (line_num, raw_line) in
      text.lines().enumerate()
    {
      let line = match raw_line
        .split_once('#')
      {
        | Some((before, _)) => before.trim(),
        | None => raw_line.trim()
      };
      if line.is_empty() {
        continue;
      }

      if let Some(include_rest) =
        line.strip_prefix("include ")
      {
        let include_path =
          resolve_include_path(
            &base_dir,
            include_rest.trim()
          )?;
        debug!(
            file = %path.display(),
            include = %include_path.display(),
            line = line_num + 1,
            "processing include"
        );

        if self
          .loaded_files
          .contains(&include_path)
        {
          warn!(include = %include_path.display(), "include cycle; skipping");
        } else if include_path.exists() {
          self
            .load_file(&include_path)?;
        } else {
          warn!(include = %include_path.display(), "include file does not exist; skipping");
        }
        continue;
      }

      let (k, v) = line
        .split_once('=')
        .ok_or_else(|| {
          anyhow!(
            "invalid config line \
             {}:{}: {}",
            path.display(),
            line_num + 1,
            raw_line
          )
        })?;

      let key = k.trim().to_string();
      let value = v.trim().to_string();
      trace!(key = %key, value = %value, "loaded config key");
      self.map.insert(key, value);
    }

    Ok(())
  }
}

#[tracing::instrument(skip(
  cfg,
  override_dir
))]
pub fn resolve_data_dir(
  cfg: &Config,
  override_dir: Option<&Path>
) -> anyhow::Result<PathBuf> {
  let dir = if let Some(path) =
    override_dir
  {
    path.to_path_buf()
  } else if let Some(cfg_value) =
    cfg.get("data.location")
  {
    expand_tilde(Path::new(&cfg_value))
  } else {
    default_data_dir()?
  };

  if !dir.exists() {
    info!(dir = %dir.display(), "creating data directory");
    fs::create_dir_all(&dir)
      .with_context(|| {
        format!(
          "failed to create {}",
          dir.display()
        )
      })?;
  }

  Ok(dir)
}

#[tracing::instrument(skip(
  override_path
))]
fn resolve_rc_path(
  override_path: Option<&Path>
) -> anyhow::Result<Option<PathBuf>> {
  if let Some(path) = override_path {
    return Ok(Some(path.to_path_buf()));
  }

  if let Ok(rc_env) =
    std::env::var(RC_ENV)
  {
    if rc_env == "/dev/null" {
      return Ok(None);
    }
    return Ok(Some(PathBuf::from(
      rc_env
    )));
  }

  let Some(home) = dirs::home_dir()
  else {
    warn!(
      "cannot determine home \
       directory; skipping rc lookup"
    );
    return Ok(None);
  };
  let candidate =
    home.join(".statusboardrc");
  if candidate.exists() {
    return Ok(Some(candidate));
  }

  Ok(None)
}

fn default_data_dir()
-> anyhow::Result<PathBuf> {
  let base = dirs::data_dir()
    .ok_or_else(|| {
      anyhow!(
        "cannot determine data \
         directory"
      )
    })?;
  Ok(base.join("statusboard"))
}

fn resolve_include_path(
  base_dir: &Path,
  include: &str
) -> anyhow::Result<PathBuf> {
  if include.trim().is_empty() {
    return Err(anyhow!(
      "include path cannot be empty"
    ));
  }

  let raw = PathBuf::from(include);
  let expanded = expand_tilde(&raw);
  if expanded.is_absolute() {
    Ok(expanded)
  } else {
    Ok(base_dir.join(expanded))
  }
}

fn expand_tilde(
  path: &Path
) -> PathBuf {
  let text = path.to_string_lossy();
  if let Some(rest) =
    text.strip_prefix("~/")
    && let Some(home) = dirs::home_dir()
  {
    return home.join(rest);
  }
  path.to_path_buf()
}

fn parse_bool(s: &str) -> bool {
  matches!(
    s.trim()
      .to_ascii_lowercase()
      .as_str(),
    "1" | "y" | "yes" | "on" | "true"
  )
}

#[cfg(test)]
mod tests {
  use std::fs;
  use std::time::Duration;

  use tempfile::tempdir;

  use super::{
    Config,
    Settings
  };

  #[test]
  fn defaults_resolve_to_default_settings()
  {
    let settings = Config::defaults()
      .settings()
      .expect("default settings");
    assert_eq!(
      settings,
      Settings::default()
    );
    assert_eq!(
      settings.reorder_debounce,
      Duration::from_millis(500)
    );
  }

  #[test]
  fn rc_file_with_include_and_overrides()
  {
    let dir = tempdir().expect("tempdir");
    let extra = dir.path().join("extra.rc");
    fs::write(
      &extra,
      "remote.timeout_secs = 30\n"
    )
    .expect("write include");
    let rc = dir.path().join("main.rc");
    fs::write(
      &rc,
      "# comment\nundo.capacity = 5 # \
       trailing\ninclude extra.rc\n"
    )
    .expect("write rc");

    let mut cfg = Config::defaults();
    cfg.load_file(&rc).expect("load rc");
    cfg.apply_overrides([(
      "rc.reorder.debounce_ms".to_string(),
      "250".to_string()
    )]);

    let settings =
      cfg.settings().expect("settings");
    assert_eq!(settings.undo_capacity, 5);
    assert_eq!(
      settings.remote_timeout,
      Duration::from_secs(30)
    );
    assert_eq!(
      settings.reorder_debounce,
      Duration::from_millis(250)
    );
    assert_eq!(cfg.loaded_files.len(), 2);
    assert_eq!(
      cfg.get_bool("color"),
      Some(true)
    );
  }

  #[test]
  fn rejects_zero_capacity_and_garbage() {
    let mut cfg = Config::defaults();
    cfg.apply_overrides([(
      "undo.capacity".to_string(),
      "0".to_string()
    )]);
    assert!(cfg.settings().is_err());

    let mut cfg = Config::defaults();
    cfg.apply_overrides([(
      "demo.latency_ms".to_string(),
      "soon".to_string()
    )]);
    assert!(cfg.settings().is_err());
  }

  #[test]
  fn malformed_lines_are_errors() {
    let dir = tempdir().expect("tempdir");
    let rc = dir.path().join("bad.rc");
    fs::write(&rc, "just words\n")
      .expect("write rc");
    let mut cfg = Config::defaults();
    assert!(cfg.load_file(&rc).is_err());
  }
}
