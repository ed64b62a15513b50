use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Programming languages an exercise can be authored in.
/// Serialized/deserialized in `lowercase` for config JSON and database columns.
/// Common aliases are accepted (e.g., "cc", "c++", "js", "c#", "golang").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    C,
    #[serde(alias = "cc", alias = "c++")]
    Cpp,
    #[serde(alias = "c#")]
    CSharp,
    #[serde(alias = "golang")]
    Go,
    Java,
    #[serde(alias = "js")]
    JavaScript,
    Kotlin,
    Python,
    R,
    Rust,
    Swift,
    #[serde(alias = "ts")]
    TypeScript,
    // No plagiarism support below this line.
    Haskell,
    Ocaml,
    Assembler,
    Vhdl,
    Matlab,
    Bash,
    Ruby,
    Php,
    Dart,
    Sql,
    PowerShell,
    Ada,
}

impl Language {
    pub const ALL: [Language; 24] = [
        Language::C,
        Language::Cpp,
        Language::CSharp,
        Language::Go,
        Language::Java,
        Language::JavaScript,
        Language::Kotlin,
        Language::Python,
        Language::R,
        Language::Rust,
        Language::Swift,
        Language::TypeScript,
        Language::Haskell,
        Language::Ocaml,
        Language::Assembler,
        Language::Vhdl,
        Language::Matlab,
        Language::Bash,
        Language::Ruby,
        Language::Php,
        Language::Dart,
        Language::Sql,
        Language::PowerShell,
        Language::Ada,
    ];

    /// Whether submissions in this language can be compared by the analyzer.
    pub fn supports_plagiarism(self) -> bool {
        matches!(
            self,
            Language::C
                | Language::Cpp
                | Language::CSharp
                | Language::Go
                | Language::Java
                | Language::JavaScript
                | Language::Kotlin
                | Language::Python
                | Language::R
                | Language::Rust
                | Language::Swift
                | Language::TypeScript
        )
    }

    /// Exact MOSS language string required by the service.
    ///
    /// MOSS has no native mode for several modern languages; those are sent as `ascii`.
    pub fn to_moss(self) -> &'static str {
        match self {
            Language::C => "c",
            Language::Cpp => "cc",
            Language::CSharp => "csharp",
            Language::Java => "java",
            Language::JavaScript => "javascript",
            Language::Python => "python",
            Language::Haskell => "haskell",
            Language::Ocaml => "ml",
            Language::Assembler => "a8086",
            Language::Vhdl => "vhdl",
            Language::Matlab => "matlab",
            Language::Ada => "ada",
            Language::Sql => "plsql",
            Language::Go
            | Language::Kotlin
            | Language::R
            | Language::Rust
            | Language::Swift
            | Language::TypeScript
            | Language::Bash
            | Language::Ruby
            | Language::Php
            | Language::Dart
            | Language::PowerShell => "ascii",
        }
    }

    /// Source file extensions (without the dot) that count towards a submission's size.
    pub fn file_extensions(self) -> &'static [&'static str] {
        match self {
            Language::C => &["c", "h"],
            Language::Cpp => &["c", "h", "cpp", "hpp"],
            Language::CSharp => &["cs"],
            Language::Go => &["go"],
            Language::Java => &["java"],
            Language::JavaScript => &["js"],
            Language::Kotlin => &["kt", "java"],
            Language::Python => &["py"],
            Language::R => &["r"],
            Language::Rust => &["rs"],
            Language::Swift => &["swift"],
            Language::TypeScript => &["ts"],
            Language::Haskell => &["hs"],
            Language::Ocaml => &["ml"],
            Language::Assembler => &["asm"],
            Language::Vhdl => &["vhd"],
            Language::Matlab => &["m"],
            Language::Bash => &["sh"],
            Language::Ruby => &["rb"],
            Language::Php => &["php"],
            Language::Dart => &["dart"],
            Language::Sql => &["sql"],
            Language::PowerShell => &["ps1"],
            Language::Ada => &["adb", "ads"],
        }
    }

    /// Canonical lowercase name, identical to the serde representation.
    pub fn as_str(self) -> &'static str {
        match self {
            Language::C => "c",
            Language::Cpp => "cpp",
            Language::CSharp => "csharp",
            Language::Go => "go",
            Language::Java => "java",
            Language::JavaScript => "javascript",
            Language::Kotlin => "kotlin",
            Language::Python => "python",
            Language::R => "r",
            Language::Rust => "rust",
            Language::Swift => "swift",
            Language::TypeScript => "typescript",
            Language::Haskell => "haskell",
            Language::Ocaml => "ocaml",
            Language::Assembler => "assembler",
            Language::Vhdl => "vhdl",
            Language::Matlab => "matlab",
            Language::Bash => "bash",
            Language::Ruby => "ruby",
            Language::Php => "php",
            Language::Dart => "dart",
            Language::Sql => "sql",
            Language::PowerShell => "powershell",
            Language::Ada => "ada",
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Language {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_ascii_lowercase();
        let canonical = match lower.as_str() {
            "cc" | "c++" => "cpp",
            "c#" => "csharp",
            "golang" => "go",
            "js" => "javascript",
            "ts" => "typescript",
            other => other,
        };
        Language::ALL
            .iter()
            .copied()
            .find(|l| l.as_str() == canonical)
            .ok_or_else(|| format!("unknown language: {s}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_aliases() {
        assert_eq!("c++".parse::<Language>().unwrap(), Language::Cpp);
        assert_eq!("C#".parse::<Language>().unwrap(), Language::CSharp);
        assert_eq!("golang".parse::<Language>().unwrap(), Language::Go);
        assert!("cobol".parse::<Language>().is_err());
    }

    #[test]
    fn display_round_trips_through_from_str() {
        for lang in Language::ALL {
            assert_eq!(lang.to_string().parse::<Language>().unwrap(), lang);
        }
    }

    #[test]
    fn serde_uses_lowercase_names() {
        let json = serde_json::to_string(&Language::JavaScript).unwrap();
        assert_eq!(json, "\"javascript\"");
        let parsed: Language = serde_json::from_str("\"c#\"").unwrap();
        assert_eq!(parsed, Language::CSharp);
    }

    #[test]
    fn unsupported_languages_are_flagged() {
        assert!(Language::Java.supports_plagiarism());
        assert!(!Language::Haskell.supports_plagiarism());
        assert!(!Language::Php.supports_plagiarism());
    }

    #[test]
    fn every_language_has_extensions() {
        for lang in Language::ALL {
            assert!(!lang.file_extensions().is_empty(), "{lang} has no extensions");
        }
    }
}
