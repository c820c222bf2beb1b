//! Corpus discovery: gitignore-aware walking with include/ignore globs.
//! - Respects .gitignore, .git/info/exclude, and global gitignore
//! - Ignore globs prune directories early and filter files late
//! - Include globs select listing files (empty = every file)
//! - Explicit file roots bypass the include filter
//! - Deterministic ordering for stable indexes and tests
//!
//! Backed by ripgrep's `ignore` crate and `globset`.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use globset::{Glob, GlobSet, GlobSetBuilder};
use ignore::{DirEntry, WalkBuilder};
use tracing::debug;

/// Gitignore-aware walker for listing files.
pub struct FileWalker
{
    /// Compiled set of additional ignore patterns
    ignore_patterns: GlobSet,

    /// Listing selectors; `None` accepts every file
    include_patterns: Option<GlobSet>,

    /// Include hidden (dot) files; default false
    include_hidden: bool,
}

fn compile(patterns: &[String]) -> Result<GlobSet>
{
    let mut builder = GlobSetBuilder::new();

    for pattern in patterns
    {
        builder.add(Glob::new(pattern).with_context(|| format!("Invalid glob pattern {pattern:?}"))?);
    }

    Ok(builder.build()?)
}

impl FileWalker
{
    /// Build a walker with additional ignore patterns (e.g. "build/**",
    /// "**/*.o"). Patterns match on paths relative to the walked root.
    pub fn new(additional_ignores: &[String]) -> Result<Self>
    {
        Ok(Self { ignore_patterns: compile(additional_ignores)?, include_patterns: None, include_hidden: false })
    }

    /// Only keep files matching one of `patterns` (e.g. "*.txt", "*.asm").
    pub fn with_include(
        mut self,
        patterns: &[String],
    ) -> Result<Self>
    {
        self.include_patterns = if patterns.is_empty() { None } else { Some(compile(patterns)?) };
        Ok(self)
    }

    /// Include or exclude hidden files (dotfiles).
    pub fn with_include_hidden(
        mut self,
        include_hidden: bool,
    ) -> Self
    {
        self.include_hidden = include_hidden;
        self
    }

    fn build_walk(
        &self,
        root: &Path,
    ) -> WalkBuilder
    {
        let mut b = WalkBuilder::new(root);

        //   WalkBuilder::hidden(true)  => *skip* dotfiles
        b.hidden(!self.include_hidden);

        b.git_ignore(true);
        b.git_global(true);
        b.git_exclude(true);

        // Early directory pruning on the relative path
        let extra = self
            .ignore_patterns
            .clone();
        let base = root.to_path_buf();
        b.filter_entry(move |ent: &DirEntry| {
            let is_dir = ent
                .file_type()
                .is_some_and(|ft| ft.is_dir());
            let rel = ent
                .path()
                .strip_prefix(&base)
                .unwrap_or(ent.path());

            !(is_dir && !rel.as_os_str().is_empty() && extra.is_match(rel))
        });

        b
    }

    fn accepts(
        &self,
        rel: &Path,
    ) -> bool
    {
        if self
            .ignore_patterns
            .is_match(rel)
        {
            return false;
        }

        self.include_patterns
            .as_ref()
            .is_none_or(|inc| inc.is_match(rel))
    }

    /// Traverse files under `root`, respecting ignore rules and globs.
    /// Returns a **sorted** list of file paths. The first unreadable
    /// entry aborts the walk.
    pub fn walk_files<P: AsRef<Path>>(
        &self,
        root: P,
    ) -> Result<Vec<PathBuf>>
    {
        let root_path = root.as_ref();
        let walker = self
            .build_walk(root_path)
            .build();

        let mut out = Vec::new();
        for res in walker
        {
            let entry = res.with_context(|| format!("Failed to walk corpus directory {}", root_path.display()))?;
            if !entry
                .file_type()
                .is_some_and(|ft| ft.is_file())
            {
                continue;
            }

            let abs = entry.into_path();
            let rel = abs
                .strip_prefix(root_path)
                .unwrap_or(abs.as_path());
            if self.accepts(rel)
            {
                out.push(abs);
            }
        }

        out.sort();

        Ok(out)
    }

    /// Expand corpus roots into listing files.
    ///
    /// Directories are walked; files named directly are always taken. A
    /// missing root is an error. The result is sorted and deduplicated.
    pub fn collect(
        &self,
        roots: &[PathBuf],
    ) -> Result<Vec<PathBuf>>
    {
        let mut out = Vec::new();

        for root in roots
        {
            if root.is_dir()
            {
                out.extend(self.walk_files(root)?);
            }
            else if root.is_file()
            {
                out.push(root.clone());
            }
            else
            {
                bail!("Corpus path not found: {}", root.display());
            }
        }

        out.sort();
        out.dedup();

        debug!(files = out.len(), "collected corpus files");
        Ok(out)
    }
}

#[cfg(test)]
mod tests
{
    use std::fs;

    use tempfile::TempDir;

    use super::*;

    /// Create a file with parent dirs as needed
    fn write_file(
        root: &Path,
        rel: &str,
        contents: &str,
    ) -> Result<()>
    {
        let path = root.join(rel);
        if let Some(parent) = path.parent()
        {
            std::fs::create_dir_all(parent)?;
        }
        fs::write(path, contents)?;
        Ok(())
    }

    fn relative(
        root: &Path,
        files: Vec<PathBuf>,
    ) -> Vec<PathBuf>
    {
        files
            .into_iter()
            .map(|p| {
                p.strip_prefix(root)
                    .unwrap()
                    .to_path_buf()
            })
            .collect()
    }

    #[test]
    fn test_include_globs_select_listings() -> Result<()>
    {
        let temp_dir = TempDir::new()?;
        let root = temp_dir.path();

        write_file(root, "b.txt", "x")?;
        write_file(root, "a.txt", "x")?;
        write_file(root, "nested/c.asm", "x")?;
        write_file(root, "notes.md", "x")?;

        let walker = FileWalker::new(&[])?.with_include(&["*.txt".into(), "*.asm".into()])?;
        let files = relative(root, walker.walk_files(root)?);

        assert_eq!(files, vec![PathBuf::from("a.txt"), PathBuf::from("b.txt"), PathBuf::from("nested/c.asm")]);
        Ok(())
    }

    #[test]
    fn test_respects_gitignore() -> Result<()>
    {
        let temp_dir = TempDir::new()?;
        let root = temp_dir.path();

        // init git repo so .gitignore applies in some environments
        let _ = std::process::Command::new("git")
            .args(["init"])
            .current_dir(root)
            .output();

        write_file(root, ".gitignore", "skip.txt")?;
        write_file(root, "skip.txt", "ignored")?;
        write_file(root, "keep.txt", "keep")?;

        let walker = FileWalker::new(&[])?.with_include(&["*.txt".into()])?;
        let files = relative(root, walker.walk_files(root)?);

        assert_eq!(files, vec![PathBuf::from("keep.txt")]);
        Ok(())
    }

    #[test]
    fn test_additional_globs_prune_and_filter() -> Result<()>
    {
        let temp_dir = TempDir::new()?;
        let root = temp_dir.path();

        write_file(root, "build/out.txt", "x")?;
        write_file(root, "src/main.txt", "x")?;
        write_file(root, "src/main.o.txt", "x")?;

        let ignores = vec!["build/**".to_string(), "**/*.o.txt".to_string()];
        let walker = FileWalker::new(&ignores)?;
        let files = relative(root, walker.walk_files(root)?);

        assert_eq!(files, vec![PathBuf::from("src/main.txt")]);
        Ok(())
    }

    #[test]
    fn test_hidden_files_excluded_by_default() -> Result<()>
    {
        let temp_dir = TempDir::new()?;
        let root = temp_dir.path();

        write_file(root, ".hidden.txt", "h")?;
        write_file(root, "visible.txt", "v")?;

        let files = relative(root, FileWalker::new(&[])?.walk_files(root)?);
        assert_eq!(files, vec![PathBuf::from("visible.txt")]);

        let files = relative(
            root,
            FileWalker::new(&[])?
                .with_include_hidden(true)
                .walk_files(root)?,
        );
        assert!(files.contains(&PathBuf::from(".hidden.txt")));
        Ok(())
    }

    #[test]
    fn test_collect_mixes_files_and_dirs() -> Result<()>
    {
        let temp_dir = TempDir::new()?;
        let root = temp_dir.path();

        write_file(root, "corpus/a.txt", "x")?;
        write_file(root, "corpus/b.txt", "x")?;
        write_file(root, "extra.lst", "x")?;

        let walker = FileWalker::new(&[])?.with_include(&["*.txt".into()])?;
        let files = walker.collect(&[root.join("extra.lst"), root.join("corpus"), root.join("corpus/a.txt")])?;

        assert_eq!(
            relative(root, files),
            vec![PathBuf::from("corpus/a.txt"), PathBuf::from("corpus/b.txt"), PathBuf::from("extra.lst")]
        );

        assert!(
            walker
                .collect(&[root.join("missing")])
                .is_err()
        );
        Ok(())
    }

    #[test]
    fn test_walk_errors_name_the_root() -> Result<()>
    {
        let temp_dir = TempDir::new()?;
        let gone = temp_dir
            .path()
            .join("missing");

        let err = FileWalker::new(&[])?
            .walk_files(&gone)
            .unwrap_err();
        assert!(format!("{err:#}").contains("missing"));
        Ok(())
    }

    #[cfg(unix)]
    #[test]
    fn test_unreadable_subdirectory_fails_collect() -> Result<()>
    {
        use std::os::unix::fs::PermissionsExt;

        let temp_dir = TempDir::new()?;
        let root = temp_dir.path();

        write_file(root, "corpus/a.txt", "x")?;
        write_file(root, "corpus/locked/b.txt", "x")?;
        let locked = root.join("corpus/locked");
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o000))?;

        // Privileged users read through mode bits; nothing to observe then
        let readable = fs::read_dir(&locked).is_ok();
        let result = FileWalker::new(&[])?.collect(&[root.join("corpus")]);
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o755))?;

        if !readable
        {
            let err = result.unwrap_err();
            assert!(format!("{err:#}").contains("corpus"));
        }
        Ok(())
    }
}
