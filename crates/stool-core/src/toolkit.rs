//! Toolkit: the catalogue of builtin directions, charts, scripts and environment
//!
//! A toolkit is loaded from a directory:
//!
//! ```text
//! toolkit/
//! ├── toolkit.yaml        # version, environment, image
//! ├── charts/<name>/      # Chart.yaml and values.yaml
//! ├── directions/*.yaml   # directions documents
//! └── scripts/*.sh
//! ```

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use serde::Deserialize;
use serde_yaml::Value as YamlValue;
use walkdir::WalkDir;

use crate::direction::{Direction, scalar_text};
use crate::directions::Directions;
use crate::error::{CoreError, Result};
use crate::script::Script;

pub const TOOLKIT_FILE: &str = "toolkit.yaml";
pub const CHARTS_DIR: &str = "charts";
pub const DIRECTIONS_DIR: &str = "directions";
pub const SCRIPTS_DIR: &str = "scripts";

/// Contents of `toolkit.yaml`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolkitFile {
    #[serde(default)]
    pub version: Option<String>,

    #[serde(default)]
    pub environment: IndexMap<String, YamlValue>,

    /// Image used to run scripts in a pod instead of a local process
    #[serde(default)]
    pub image: Option<String>,
}

/// A deployable chart and the directions derived from its values
#[derive(Debug, Clone, PartialEq)]
pub struct Chart {
    pub name: String,
    pub version: Option<String>,
    /// Path or registry reference passed to the packaging tool
    pub reference: String,
    pub directions: Directions,
}

#[derive(Debug, Default, Deserialize)]
struct ChartFile {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    version: Option<YamlValue>,
}

impl Chart {
    /// Create a chart with empty directions
    pub fn new(name: impl Into<String>, version: Option<String>, reference: impl Into<String>) -> Self {
        let name = name.into();
        let directions = Directions::new(name.clone()).with_chart(name.clone(), version.clone());
        Self {
            name,
            version,
            reference: reference.into(),
            directions,
        }
    }

    /// Load a chart directory. Each top-level key of `values.yaml` becomes a direction.
    pub fn load(dir: &Path) -> Result<Self> {
        let dir_name = dir
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| invalid(format!("invalid chart directory: {}", dir.display())))?;

        let chart_file = dir.join("Chart.yaml");
        let meta: ChartFile = if chart_file.exists() {
            serde_yaml::from_str(&std::fs::read_to_string(&chart_file)?)?
        } else {
            ChartFile::default()
        };
        let name = meta.name.unwrap_or_else(|| dir_name.to_string());
        let version = meta.version.as_ref().and_then(scalar_text);

        let mut chart = Chart::new(name, version, dir.to_string_lossy());
        let values_file = dir.join("values.yaml");
        if values_file.exists() {
            let values: YamlValue = serde_yaml::from_str(&std::fs::read_to_string(&values_file)?)?;
            match values {
                YamlValue::Mapping(entries) => {
                    for (key, node) in &entries {
                        let key = key.as_str().ok_or_else(|| {
                            invalid(format!("{}: string key expected", values_file.display()))
                        })?;
                        chart.directions.add_new(Direction::for_yaml(key, node)?)?;
                    }
                }
                YamlValue::Null => {}
                _ => {
                    return Err(invalid(format!(
                        "{}: object expected",
                        values_file.display()
                    )));
                }
            }
        }
        Ok(chart)
    }
}

/// The read-only catalogue used to resolve and evaluate directions
#[derive(Debug, Clone)]
pub struct Toolkit {
    version: String,
    environment: IndexMap<String, String>,
    image: Option<String>,
    home: Option<PathBuf>,
    directions: HashMap<String, Directions>,
    charts: HashMap<String, Chart>,
    scripts: Vec<Script>,
}

impl Toolkit {
    /// Create an empty toolkit
    pub fn new(version: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            environment: IndexMap::new(),
            image: None,
            home: None,
            directions: HashMap::new(),
            charts: HashMap::new(),
            scripts: Vec::new(),
        }
    }

    /// Load a toolkit directory
    pub fn load(dir: &Path) -> Result<Self> {
        let file = dir.join(TOOLKIT_FILE);
        if !file.exists() {
            return Err(invalid(format!("{} not found", file.display())));
        }
        let config: ToolkitFile = serde_yaml::from_str(&std::fs::read_to_string(&file)?)?;

        let mut toolkit = Toolkit::new(config.version.unwrap_or_else(|| "unknown".to_string()));
        toolkit.home = Some(dir.to_path_buf());
        toolkit.image = config.image;
        for (name, value) in &config.environment {
            let value = scalar_text(value)
                .ok_or_else(|| invalid(format!("environment.{name}: scalar expected")))?;
            toolkit.environment.insert(name.clone(), value);
        }

        for path in sorted_entries(&dir.join(CHARTS_DIR), |e| e.file_type().is_dir())? {
            toolkit.add_chart(Chart::load(&path)?)?;
        }
        for path in sorted_entries(&dir.join(DIRECTIONS_DIR), is_yaml_file)? {
            for directions in load_directions_file(&path)? {
                toolkit.add_directions(directions)?;
            }
        }
        toolkit.scripts = Script::scan(&dir.join(SCRIPTS_DIR))?;
        Ok(toolkit)
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    /// Directory the toolkit was loaded from
    pub fn home(&self) -> Option<&Path> {
        self.home.as_deref()
    }

    pub fn image(&self) -> Option<&str> {
        self.image.as_deref()
    }

    pub fn set_image(&mut self, image: Option<String>) {
        self.image = image;
    }

    pub fn environment(&self) -> &IndexMap<String, String> {
        &self.environment
    }

    pub fn set_environment(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.environment.insert(name.into(), value.into());
    }

    /// Replace values of known environment variables; unknown names are an error
    pub fn override_environment(&mut self, overrides: &IndexMap<String, String>) -> Result<()> {
        for (name, value) in overrides {
            let slot = self
                .environment
                .get_mut(name)
                .ok_or_else(|| CoreError::UnknownEnvironment { name: name.clone() })?;
            *slot = value.clone();
        }
        Ok(())
    }

    pub fn directions(&self, name: &str) -> Result<&Directions> {
        self.directions
            .get(name)
            .ok_or_else(|| CoreError::DirectionsNotFound {
                name: name.to_string(),
            })
    }

    /// Names of all builtin directions, sorted
    pub fn directions_names(&self) -> Vec<&str> {
        let mut names: Vec<_> = self.directions.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn add_directions(&mut self, directions: Directions) -> Result<()> {
        if self.directions.contains_key(&directions.subject) {
            return Err(CoreError::DuplicateDirections {
                name: directions.subject,
            });
        }
        self.directions
            .insert(directions.subject.clone(), directions);
        Ok(())
    }

    /// Register a chart; its directions become available as a base under the chart name
    pub fn add_chart(&mut self, chart: Chart) -> Result<()> {
        if self.charts.contains_key(&chart.name) {
            return Err(CoreError::DuplicateChart { name: chart.name });
        }
        self.add_directions(chart.directions.clone())?;
        self.charts.insert(chart.name.clone(), chart);
        Ok(())
    }

    pub fn chart(&self, name: &str) -> Result<&Chart> {
        self.charts.get(name).ok_or_else(|| CoreError::ChartNotFound {
            name: name.to_string(),
        })
    }

    pub fn charts(&self) -> impl Iterator<Item = &Chart> {
        self.charts.values()
    }

    pub fn scripts(&self) -> &[Script] {
        &self.scripts
    }

    pub fn add_script(&mut self, script: Script) {
        self.scripts.push(script);
    }

    /// Merge every builtin bundle so definition errors surface before evaluation
    pub fn validate(&self) -> Result<()> {
        for name in self.directions_names() {
            self.directions(name)?.merged(self)?;
        }
        Ok(())
    }
}

fn load_directions_file(path: &Path) -> Result<Vec<Directions>> {
    let doc: YamlValue = serde_yaml::from_str(&std::fs::read_to_string(path)?)?;
    let wrap = |err: CoreError| invalid(format!("{}: {err}", path.display()));
    match doc {
        YamlValue::Sequence(items) => items
            .iter()
            .map(|item| Directions::load(item).map_err(wrap))
            .collect(),
        other => Ok(vec![Directions::load(&other).map_err(wrap)?]),
    }
}

fn sorted_entries(
    dir: &Path,
    filter: impl Fn(&walkdir::DirEntry) -> bool,
) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut result = Vec::new();
    for entry in WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
    {
        let entry = entry.map_err(std::io::Error::from)?;
        if filter(&entry) {
            result.push(entry.into_path());
        }
    }
    Ok(result)
}

fn is_yaml_file(entry: &walkdir::DirEntry) -> bool {
    entry.file_type().is_file()
        && matches!(
            entry.path().extension().and_then(|e| e.to_str()),
            Some("yaml") | Some("yml")
        )
}

fn invalid(message: impl Into<String>) -> CoreError {
    CoreError::InvalidToolkit {
        message: message.into(),
    }
}
