//! Static content tables for the personas.
//!
//! Content lives as flat JSON files under a data directory and is loaded once
//! at startup into a read-only [`ContentLibrary`] that gets injected into the
//! tool services. A missing file is seeded with its built-in default exactly
//! once, so a fresh checkout works without any provisioning step.

use anyhow::{Context, Result};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use std::fs;
use std::path::Path;
use tracing::{info, warn};

/// One teachable concept inside a course file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Concept {
    pub id: String,
    pub title: String,
    pub summary: String,
    pub sample_question: String,
}

/// A named course: the file stem of its JSON file plus its concept list.
#[derive(Debug, Clone, PartialEq)]
pub struct Course {
    pub name: String,
    pub concepts: Vec<Concept>,
}

/// Read-only content handed to the tool services at session start.
#[derive(Debug, Clone, Default)]
pub struct ContentLibrary {
    pub scenarios: Vec<String>,
    pub courses: Vec<Course>,
}

impl ContentLibrary {
    /// Loads all content tables from `data_dir`, seeding defaults for
    /// anything absent. The scenario deck lives at
    /// `<data_dir>/bollywood_scenarios.json`; courses are all `*.json` files
    /// under `<data_dir>/courses/`.
    pub fn load(data_dir: &Path) -> Result<Self> {
        fs::create_dir_all(data_dir)
            .with_context(|| format!("Failed to create data directory {}", data_dir.display()))?;

        let scenarios = load_or_init(
            &data_dir.join("bollywood_scenarios.json"),
            default_scenarios,
        )?;

        let courses_dir = data_dir.join("courses");
        fs::create_dir_all(&courses_dir)?;
        let has_course_files = fs::read_dir(&courses_dir)?
            .filter_map(|e| e.ok())
            .any(|e| e.path().extension().is_some_and(|ext| ext == "json"));
        if !has_course_files {
            write_json_atomic(&courses_dir.join("go.json"), &default_go_course())?;
            info!("Seeded default Go course");
        }

        let mut courses = Vec::new();
        let mut entries: Vec<_> = fs::read_dir(&courses_dir)?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.extension().is_some_and(|ext| ext == "json"))
            .collect();
        entries.sort();
        for path in entries {
            let name = path
                .file_stem()
                .and_then(|s| s.to_str())
                .context("Course file has no readable stem")?
                .to_string();
            match fs::read_to_string(&path)
                .map_err(anyhow::Error::from)
                .and_then(|text| serde_json::from_str::<Vec<Concept>>(&text).map_err(Into::into))
            {
                Ok(concepts) => courses.push(Course { name, concepts }),
                Err(e) => warn!(course = %name, error = %e, "Skipping unreadable course file"),
            }
        }

        info!(
            scenarios = scenarios.len(),
            courses = courses.len(),
            "Content library loaded"
        );
        Ok(Self { scenarios, courses })
    }

    pub fn course_names(&self) -> Vec<&str> {
        self.courses.iter().map(|c| c.name.as_str()).collect()
    }
}

/// Reads `path` as JSON, writing `default()` there first if the file does not
/// exist. An existing-but-unparseable file is left untouched and the default
/// table is returned, so a hand-edited file never gets clobbered.
pub fn load_or_init<T, F>(path: &Path, default: F) -> Result<T>
where
    T: Serialize + DeserializeOwned,
    F: FnOnce() -> T,
{
    if !path.exists() {
        let value = default();
        write_json_atomic(path, &value)?;
        info!(path = %path.display(), "Seeded default content file");
        return Ok(value);
    }
    let text = fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    match serde_json::from_str(&text) {
        Ok(value) => Ok(value),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Content file unparseable, using defaults");
            Ok(default())
        }
    }
}

/// Serializes `value` to `path` through a sibling temp file and a rename, so
/// a crash mid-write never leaves a half-written JSON file behind.
pub fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = Path::new(&tmp);
    let json = serde_json::to_string_pretty(value)?;
    fs::write(tmp, json).with_context(|| format!("Failed to write {}", tmp.display()))?;
    fs::rename(tmp, path)
        .with_context(|| format!("Failed to move {} into place", tmp.display()))?;
    Ok(())
}

/// The built-in Bollywood scenario deck.
pub fn default_scenarios() -> Vec<String> {
    [
        "You're a Mumbai chaiwala whose special masala chai can make people fall in love. A customer just drank it and is staring at you romantically.",
        "You're a Bollywood director explaining to a new actor why they must dance in the rain while singing a love song to a tree.",
        "You're a Punjabi wedding planner convincing a budget-conscious client why they NEED a horse, 500 guests, and fireworks for a simple ceremony.",
        "You're an auto-rickshaw driver in Delhi who just realized your passenger is your school crush from 20 years ago.",
        "You're a Kolkata street food vendor whose special puchka recipe was just stolen by a rival. Confront them dramatically.",
        "You're a Bollywood backup dancer trying to teach a clumsy American tourist how to do the 'lungi dance' for a movie shoot.",
        "You're at a family wedding and just ate the last gulab jamun that was meant for the bride. The aunties are coming!",
        "You're a yoga guru in Rishikesh who discovers your new foreign student is actually a Hollywood spy learning your secrets.",
        "You're a Mumbai dabbawala who accidentally delivered a marriage proposal tiffin to a grumpy office worker instead of their intended recipient.",
        "You're a Kashmiri shikara driver showing Dal Lake to a tourist who's never seen snow. A sudden snowstorm begins!",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

/// The built-in Go programming course.
pub fn default_go_course() -> Vec<Concept> {
    fn concept(id: &str, title: &str, summary: &str, sample_question: &str) -> Concept {
        Concept {
            id: id.into(),
            title: title.into(),
            summary: summary.into(),
            sample_question: sample_question.into(),
        }
    }
    vec![
        concept(
            "variables",
            "Variables in Go",
            "Variables in Go store values and must be declared with a specific type. Use 'var' keyword or short declaration ':='. Go is statically typed and supports type inference.",
            "How do you declare a variable in Go and what's the difference between 'var' and short declaration?",
        ),
        concept(
            "constants",
            "Constants",
            "Constants in Go are immutable values declared with 'const' keyword. They can be typed or untyped and are evaluated at compile time.",
            "What are constants in Go and how do they differ from variables?",
        ),
        concept(
            "loops",
            "Loops in Go",
            "Go has only 'for' loops that can work as traditional for, while, or infinite loops. No while or do-while keywords - everything uses for.",
            "How does Go implement different types of loops using only the 'for' keyword?",
        ),
        concept(
            "conditionals",
            "Conditional Statements",
            "Go has if-else statements and switch statements. If can include initialization statements. Switch is more flexible than in other languages.",
            "What are the key features of Go's if and switch statements?",
        ),
        concept(
            "arrays-slices",
            "Arrays and Slices",
            "Arrays have fixed size, slices are dynamic views into arrays. Slices are more commonly used and have built-in functions like append and copy.",
            "What's the difference between arrays and slices in Go?",
        ),
        concept(
            "maps",
            "Maps",
            "Maps are key-value collections. They're reference types and need to be initialized with make(). Provide fast lookups by key.",
            "How do you create and use maps in Go?",
        ),
        concept(
            "functions",
            "Functions",
            "Functions are first-class citizens in Go. They can return multiple values, have named returns, and can be assigned to variables.",
            "What are the special features of functions in Go compared to other languages?",
        ),
        concept(
            "variadic-functions",
            "Variadic Functions",
            "Variadic functions accept variable number of arguments using '...' syntax. The arguments are treated as a slice inside the function.",
            "How do variadic functions work in Go?",
        ),
        concept(
            "closures",
            "Closures",
            "Closures are functions that capture variables from their surrounding scope. They maintain state between calls.",
            "What are closures in Go and when would you use them?",
        ),
        concept(
            "pointers",
            "Pointers",
            "Pointers hold memory addresses. Go has pointers but no pointer arithmetic. Used for passing references and modifying original values.",
            "How do pointers work in Go and what are their limitations?",
        ),
        concept(
            "structs",
            "Structs",
            "Structs are collections of fields that define a type. They support embedding and can have methods attached to them.",
            "What are structs in Go and how do they support composition?",
        ),
        concept(
            "interfaces",
            "Interfaces",
            "Interfaces define method sets. Types implicitly implement interfaces by implementing all methods. Empty interface 'interface{}' accepts any type.",
            "How does Go's interface system differ from other languages?",
        ),
        concept(
            "enums",
            "Enums (Iota)",
            "Go doesn't have enums but uses iota with constants to create enumerated values. Iota auto-increments in const blocks.",
            "How do you implement enums in Go using iota?",
        ),
        concept(
            "generics",
            "Generics",
            "Generics allow writing type-safe, reusable code. Introduced in Go 1.18 with type parameters and constraints.",
            "How do generics work in Go and what problems do they solve?",
        ),
        concept(
            "goroutines",
            "Goroutines",
            "Goroutines are lightweight threads managed by the Go runtime. Started with 'go' keyword. They're cheaper than OS threads.",
            "What are goroutines and how do they enable concurrency?",
        ),
        concept(
            "channels",
            "Channels",
            "Channels are typed conduits for communication between goroutines. They can be buffered or unbuffered and support synchronization.",
            "What are channels and how do they help in goroutine communication?",
        ),
        concept(
            "waitgroups",
            "WaitGroups",
            "WaitGroups synchronize goroutines by waiting for a collection to finish. Use Add(), Done(), and Wait() methods.",
            "How do WaitGroups help in managing goroutine execution?",
        ),
        concept(
            "mutex",
            "Mutex and Synchronization",
            "Mutex (mutual exclusion) protects shared resources from concurrent access. Sync package provides Mutex and RWMutex for locking.",
            "When and how would you use mutex in Go programs?",
        ),
        concept(
            "error-handling",
            "Error Handling",
            "Go uses explicit error return values instead of exceptions. Errors are values that implement the error interface. Multiple return values facilitate this.",
            "How does Go handle errors differently from exception-based languages?",
        ),
        concept(
            "file-operations",
            "File Operations",
            "Go's os and io packages provide file operations. Includes reading, writing, creating, and deleting files with proper error handling.",
            "What are the main packages and patterns for file operations in Go?",
        ),
        concept(
            "packages",
            "Packages and Modules",
            "Go code is organized in packages. Modules manage dependencies and versioning. Each file belongs to a package and exports capitalized identifiers.",
            "How does Go's package system work and what are modules?",
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn load_seeds_defaults_once_and_reads_them_back() {
        let dir = tempdir().unwrap();

        let first = ContentLibrary::load(dir.path()).unwrap();
        assert_eq!(first.scenarios, default_scenarios());
        assert_eq!(first.courses.len(), 1);
        assert_eq!(first.courses[0].name, "go");
        assert_eq!(first.courses[0].concepts, default_go_course());

        // A second load must read back exactly the seeded tables, not reseed.
        let scenarios_path = dir.path().join("bollywood_scenarios.json");
        let seeded = std::fs::read_to_string(&scenarios_path).unwrap();
        let second = ContentLibrary::load(dir.path()).unwrap();
        assert_eq!(second.scenarios, first.scenarios);
        assert_eq!(second.courses, first.courses);
        assert_eq!(std::fs::read_to_string(&scenarios_path).unwrap(), seeded);
    }

    #[test]
    fn edited_content_file_wins_over_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bollywood_scenarios.json");
        write_json_atomic(&path, &vec!["A custom scene".to_string()]).unwrap();

        let library = ContentLibrary::load(dir.path()).unwrap();
        assert_eq!(library.scenarios, vec!["A custom scene".to_string()]);
    }

    #[test]
    fn unparseable_file_falls_back_without_clobbering() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bollywood_scenarios.json");
        std::fs::write(&path, "not json at all").unwrap();

        let scenarios = load_or_init(&path, default_scenarios).unwrap();
        assert_eq!(scenarios, default_scenarios());
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "not json at all");
    }

    #[test]
    fn atomic_write_leaves_no_temp_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("table.json");
        write_json_atomic(&path, &vec![1, 2, 3]).unwrap();

        assert!(path.exists());
        let siblings: Vec<_> = std::fs::read_dir(path.parent().unwrap())
            .unwrap()
            .filter_map(|e| e.ok())
            .collect();
        assert_eq!(siblings.len(), 1);
    }

    #[test]
    fn extra_course_files_are_picked_up() {
        let dir = tempdir().unwrap();
        let courses_dir = dir.path().join("courses");
        write_json_atomic(
            &courses_dir.join("rust.json"),
            &vec![Concept {
                id: "ownership".into(),
                title: "Ownership".into(),
                summary: "Every value has a single owner.".into(),
                sample_question: "What happens when a value's owner goes out of scope?".into(),
            }],
        )
        .unwrap();

        let library = ContentLibrary::load(dir.path()).unwrap();
        let names = library.course_names();
        assert!(names.contains(&"rust"));
        // go course is only seeded when the directory starts empty
        assert!(!names.contains(&"go"));
    }
}
