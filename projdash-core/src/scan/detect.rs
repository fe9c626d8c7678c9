//! Marker-file detection for a project directory.
//!
//! Everything here is a cheap existence check or a small file read; the only
//! deep traversal is [`count_source_lines`].

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;

use super::{FileFlags, Languages};

/// Marker file → language, in priority order.
const LANGUAGE_INDICATORS: &[(&str, &str)] = &[
    ("package.json", "JavaScript/TypeScript"),
    ("pyproject.toml", "Python"),
    ("setup.py", "Python"),
    ("requirements.txt", "Python"),
    ("Cargo.toml", "Rust"),
    ("go.mod", "Go"),
    ("Gemfile", "Ruby"),
    ("build.gradle", "Java/Kotlin"),
    ("pom.xml", "Java"),
    ("mix.exs", "Elixir"),
    ("Package.swift", "Swift"),
    ("composer.json", "PHP"),
    ("index.html", "HTML/CSS"),
];

const SOURCE_EXTENSIONS: &[&str] = &[
    "py", "ts", "tsx", "js", "jsx", "rs", "go", "rb", "java", "kt", "ex", "exs", "swift", "php",
    "c", "cpp", "h",
];

const SKIP_WALK_DIRS: &[&str] = &[
    "node_modules", ".venv", ".git", "__pycache__", "dist", "build", ".next", "target", ".tox",
    "venv", "env",
];

/// Upper bound on files read per project so a vendored monorepo can't stall a scan.
const MAX_WALK_FILES: usize = 20_000;

/// Lockfile → package manager, in priority order.
const LOCKFILES: &[(&str, &str)] = &[
    ("pnpm-lock.yaml", "pnpm"),
    ("package-lock.json", "npm"),
    ("yarn.lock", "yarn"),
    ("bun.lockb", "bun"),
    ("Cargo.lock", "cargo"),
    ("uv.lock", "uv"),
    ("poetry.lock", "poetry"),
    ("Pipfile.lock", "pipenv"),
];

const LINTER_FILES: &[&str] = &[
    ".eslintrc", ".eslintrc.js", ".eslintrc.json", ".eslintrc.yml", "eslint.config.js",
    "eslint.config.mjs", "eslint.config.ts", ".prettierrc", ".prettierrc.js", ".prettierrc.json",
    "biome.json", "biome.jsonc", ".flake8", ".pylintrc", "pyproject.toml", ".rubocop.yml",
    "rustfmt.toml", "clippy.toml",
];

const TEST_DIRS: &[&str] = &["tests", "test", "__tests__", "spec", "src/tests", "src/__tests__"];

/// npm dependency name (or scope prefix) → external service.
const SERVICE_DEPS: &[(&str, &str)] = &[
    ("@supabase/supabase-js", "supabase"),
    ("posthog-js", "posthog"),
    ("posthog-node", "posthog"),
    ("stripe", "stripe"),
    ("firebase", "firebase"),
    ("firebase-admin", "firebase"),
    ("@aws-sdk", "aws"),
    ("@prisma/client", "prisma"),
    ("mongoose", "mongodb"),
    ("@sentry", "sentry"),
];

/// `.env` key prefix → external service.
const ENV_KEY_PREFIXES: &[(&str, &str)] = &[
    ("SUPABASE_", "supabase"),
    ("POSTHOG_", "posthog"),
    ("NEXT_PUBLIC_POSTHOG", "posthog"),
    ("STRIPE_", "stripe"),
    ("FIREBASE_", "firebase"),
    ("AWS_", "aws"),
    ("DATABASE_URL", "database"),
    ("SENTRY_", "sentry"),
    ("OPENAI_", "openai"),
    ("ANTHROPIC_", "anthropic"),
];

/// Check if a file exists in the project.
fn exists(project_path: &Path, filename: &str) -> bool {
    project_path.join(filename).exists()
}

#[derive(Debug, Default, Deserialize)]
struct PackageJson {
    description: Option<String>,
    #[serde(default)]
    scripts: BTreeMap<String, serde_json::Value>,
    #[serde(default)]
    dependencies: BTreeMap<String, serde_json::Value>,
    #[serde(default, rename = "devDependencies")]
    dev_dependencies: BTreeMap<String, serde_json::Value>,
}

fn read_package_json(project_path: &Path) -> Option<PackageJson> {
    let content = fs::read_to_string(project_path.join("package.json")).ok()?;
    serde_json::from_str(&content).ok()
}

/// Detected languages by marker files; `tsconfig.json` upgrades JS to TypeScript.
pub fn detect_languages(project_path: &Path) -> Languages {
    let mut langs = Languages::default();

    for (indicator, lang) in LANGUAGE_INDICATORS {
        if exists(project_path, indicator) {
            if !langs.detected.iter().any(|d| d == lang) {
                langs.detected.push(lang.to_string());
            }
            if langs.primary.is_none() {
                langs.primary = Some(lang.to_string());
            }
        }
    }

    if exists(project_path, "tsconfig.json") {
        if langs.detected.iter().any(|d| d == "JavaScript/TypeScript") {
            langs.primary = Some("TypeScript".to_string());
        } else if !langs.detected.iter().any(|d| d == "TypeScript") {
            langs.detected.push("TypeScript".to_string());
            langs.primary.get_or_insert_with(|| "TypeScript".to_string());
        }
    }

    langs
}

/// Presence flags for the hygiene-relevant files.
pub fn check_files(project_path: &Path) -> std::io::Result<FileFlags> {
    let has_test_named_entry = fs::read_dir(project_path)?
        .filter_map(|e| e.ok())
        .any(|e| e.file_name().to_string_lossy().contains("test"));

    Ok(FileFlags {
        readme: exists(project_path, "README.md") || exists(project_path, "readme.md"),
        tests: TEST_DIRS.iter().any(|d| exists(project_path, d)) || has_test_named_entry,
        env: exists(project_path, ".env"),
        env_example: exists(project_path, ".env.example"),
        dockerfile: exists(project_path, "Dockerfile"),
        docker_compose: exists(project_path, "docker-compose.yml")
            || exists(project_path, "docker-compose.yaml")
            || exists(project_path, "compose.yml"),
        linter_config: LINTER_FILES.iter().any(|f| exists(project_path, f)),
        license: exists(project_path, "LICENSE") || exists(project_path, "LICENSE.md"),
        lockfile: LOCKFILES.iter().any(|(f, _)| exists(project_path, f)),
    })
}

pub fn check_cicd(project_path: &Path) -> BTreeMap<String, bool> {
    BTreeMap::from([
        ("githubActions".to_string(), project_path.join(".github/workflows").exists()),
        ("circleci".to_string(), exists(project_path, ".circleci")),
        ("travis".to_string(), exists(project_path, ".travis.yml")),
        ("gitlabCi".to_string(), exists(project_path, ".gitlab-ci.yml")),
    ])
}

pub fn check_deployment(project_path: &Path) -> BTreeMap<String, bool> {
    BTreeMap::from([
        ("fly".to_string(), exists(project_path, "fly.toml")),
        ("vercel".to_string(), exists(project_path, "vercel.json")),
        ("netlify".to_string(), exists(project_path, "netlify.toml")),
    ])
}

/// Best-effort framework detection from config files and manifest contents.
pub fn detect_framework(project_path: &Path) -> Option<String> {
    let found = |name: &str| Some(name.to_string());

    if exists(project_path, "next.config.js")
        || exists(project_path, "next.config.ts")
        || exists(project_path, "next.config.mjs")
    {
        return found("nextjs");
    }
    if exists(project_path, "nuxt.config.js") || exists(project_path, "nuxt.config.ts") {
        return found("nuxt");
    }
    if exists(project_path, "svelte.config.js") {
        return found("sveltekit");
    }
    if exists(project_path, "vite.config.js") || exists(project_path, "vite.config.ts") {
        return found("vite");
    }

    if let Ok(content) = fs::read_to_string(project_path.join("pyproject.toml")) {
        for fw in ["fastapi", "django", "flask"] {
            if content.contains(fw) {
                return found(fw);
            }
        }
    }

    if let Ok(content) = fs::read_to_string(project_path.join("Cargo.toml")) {
        if content.contains("axum") {
            return found("axum");
        } else if content.contains("actix-web") {
            return found("actix");
        }
    }

    if let Ok(content) = fs::read_to_string(project_path.join("go.mod")) {
        if content.contains("gin-gonic") {
            return found("gin");
        }
    }

    None
}

pub fn detect_package_manager(project_path: &Path) -> Option<String> {
    LOCKFILES
        .iter()
        .find(|(file, _)| exists(project_path, file))
        .map(|(_, manager)| manager.to_string())
}

/// External services inferred from npm dependencies and `.env` key prefixes.
pub fn detect_services(project_path: &Path) -> Vec<String> {
    let mut services = BTreeSet::new();

    if let Some(pkg) = read_package_json(project_path) {
        for dep in pkg.dependencies.keys().chain(pkg.dev_dependencies.keys()) {
            for (pattern, service) in SERVICE_DEPS {
                if dep == pattern || dep.starts_with(&format!("{pattern}/")) {
                    services.insert(service.to_string());
                }
            }
        }
    }

    for env_file in [".env", ".env.local", ".env.development"] {
        let Ok(content) = fs::read_to_string(project_path.join(env_file)) else {
            continue;
        };
        for line in content.lines().map(str::trim) {
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let key = line.split('=').next().unwrap_or_default().trim();
            for (prefix, service) in ENV_KEY_PREFIXES {
                if key.starts_with(prefix) {
                    services.insert(service.to_string());
                }
            }
        }
    }

    services.into_iter().collect()
}

pub fn detect_scripts(project_path: &Path) -> Vec<String> {
    read_package_json(project_path)
        .map(|pkg| pkg.scripts.into_keys().collect())
        .unwrap_or_default()
}

/// Project description from `package.json`, then `pyproject.toml`, then `Cargo.toml`.
pub fn detect_description(project_path: &Path) -> Option<String> {
    if let Some(desc) = read_package_json(project_path)
        .and_then(|pkg| pkg.description)
        .filter(|d| !d.is_empty())
    {
        return Some(desc);
    }

    for manifest in ["pyproject.toml", "Cargo.toml"] {
        let Ok(text) = fs::read_to_string(project_path.join(manifest)) else {
            continue;
        };
        for line in text.lines() {
            if !line.trim_start().starts_with("description") {
                continue;
            }
            if let Some((_, value)) = line.split_once('=') {
                let value = value.trim().trim_matches(|c| c == '"' || c == '\'');
                if !value.is_empty() {
                    return Some(value.to_string());
                }
            }
        }
    }

    None
}

/// Line totals from walking source files.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SourceCounts {
    pub todo: u32,
    pub fixme: u32,
    pub loc: u64,
}

/// Walk source files counting lines and TODO/FIXME markers.
///
/// Unreadable entries are skipped; the walk stops after [`MAX_WALK_FILES`] files.
pub fn count_source_lines(project_path: &Path) -> SourceCounts {
    let mut counts = SourceCounts::default();
    let mut files_seen = 0usize;
    let mut stack = vec![project_path.to_path_buf()];

    while let Some(dir) = stack.pop() {
        let Ok(entries) = fs::read_dir(&dir) else {
            continue;
        };
        for entry in entries.filter_map(|e| e.ok()) {
            let Ok(file_type) = entry.file_type() else {
                continue;
            };
            let path = entry.path();
            if file_type.is_dir() {
                let name = entry.file_name();
                if !SKIP_WALK_DIRS.contains(&&*name.to_string_lossy()) {
                    stack.push(path);
                }
                continue;
            }
            if !file_type.is_file() {
                continue;
            }
            let is_source = path
                .extension()
                .map(|ext| SOURCE_EXTENSIONS.contains(&&*ext.to_string_lossy()))
                .unwrap_or(false);
            if !is_source {
                continue;
            }
            if files_seen >= MAX_WALK_FILES {
                return counts;
            }
            files_seen += 1;

            let Ok(content) = fs::read_to_string(&path) else {
                continue;
            };
            for line in content.lines() {
                counts.loc += 1;
                if line.contains("TODO") {
                    counts.todo += 1;
                }
                if line.contains("FIXME") {
                    counts.fixme += 1;
                }
            }
        }
    }

    counts
}
