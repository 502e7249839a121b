//! Offline maintenance sweeps: duplicate renders, demoted downloads, rows
//! whose files vanished, and files no row references anymore.

use anyhow::Result;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::info;
use walkdir::WalkDir;

use crate::constants;
use crate::state::AppContext;
use crate::strategy;

pub async fn run(ctx: &AppContext) -> Result<()> {
    dedupe_quiz_parts(ctx).await?;
    demote_inferior_downloads(ctx).await?;
    drop_rows_without_files(ctx).await?;
    unlink_orphan_files(ctx).await?;
    Ok(())
}

/// Step 1: at most one render per (timing, difficulty, style) — keep the
/// highest id of each group.
async fn dedupe_quiz_parts(ctx: &AppContext) -> Result<()> {
    let doomed = ctx.store.quiz_parts().duplicate_ids().await?;
    for id in &doomed {
        if let Some(part) = ctx.store.quiz_parts().get(*id).await? {
            remove_quietly(&part.local_fp);
        }
        ctx.store.quiz_parts().delete(*id).await?;
    }
    info!("Duplicate quiz parts deleted: {}", doomed.len());
    Ok(())
}

/// Step 2: a qitem needs only its best-priority downloaded copy; null the
/// `local_fp` of inferior downloads so the file sweep can reclaim the disk.
async fn demote_inferior_downloads(ctx: &AppContext) -> Result<()> {
    let priorities = ctx.find_priorities();
    let mut demoted = 0usize;

    for qitem_id in ctx.store.sources().qitem_ids_with_downloads().await? {
        let sources = ctx.store.sources().all_for_qitem(qitem_id).await?;
        let mut downloaded: Vec<_> = sources
            .into_iter()
            .filter(|s| !s.invalid && s.local_fp.is_some())
            .collect();
        if downloaded.len() < 2 {
            continue;
        }

        downloaded.sort_by(|a, b| {
            strategy::rank(&priorities, &a.added_by)
                .cmp(&strategy::rank(&priorities, &b.added_by))
                .then(b.updated_at.cmp(&a.updated_at))
        });

        for source in &downloaded[1..] {
            info!(
                "Demoting source id={} (qitem_id={}, added_by={})",
                source.id, qitem_id, source.added_by
            );
            ctx.store.sources().clear_local_fp(source.id).await?;
            demoted += 1;
        }
    }
    info!("Demoted downloads: {demoted}");
    Ok(())
}

/// Step 3: rows pointing at files that no longer exist are dead weight.
async fn drop_rows_without_files(ctx: &AppContext) -> Result<()> {
    let mut dropped = 0usize;

    for source in ctx.store.sources().downloaded().await? {
        let Some(fp) = &source.local_fp else { continue };
        if !Path::new(fp).exists() {
            info!("Deleting source id={} ({fp:?} is gone)", source.id);
            ctx.store.sources().delete(source.id).await?;
            dropped += 1;
        }
    }

    for part in ctx.store.quiz_parts().all().await? {
        if part.local_fp.is_empty() || !Path::new(&part.local_fp).exists() {
            info!(
                "Deleting quiz part id={} ({:?} is gone)",
                part.id, part.local_fp
            );
            ctx.store.quiz_parts().delete(part.id).await?;
            dropped += 1;
        }
    }

    info!("Rows without files deleted: {dropped}");
    Ok(())
}

/// Step 4: files under the managed trees that no live row references.
async fn unlink_orphan_files(ctx: &AppContext) -> Result<()> {
    // Collected before the sweep so both trees see one consistent set.
    let mut used: HashSet<PathBuf> = HashSet::new();
    for s in ctx.store.sources().downloaded().await? {
        if let Some(fp) = s.local_fp {
            used.insert(resolve(&fp));
        }
    }
    for p in ctx.store.quiz_parts().all().await? {
        if !p.local_fp.is_empty() {
            used.insert(resolve(&p.local_fp));
        }
    }

    let resources = ctx.config.resources_dir();
    for tree in [constants::SOURCES_DIR, constants::QUIZPARTS_DIR] {
        let root = resources.join(tree);
        if !root.exists() {
            continue;
        }
        let mut removed = 0usize;
        for entry in WalkDir::new(&root).into_iter().filter_map(Result::ok) {
            if !entry.file_type().is_file() {
                continue;
            }
            let path = resolve(&entry.path().display().to_string());
            if !used.contains(&path) {
                info!("Removing orphan file {}", path.display());
                std::fs::remove_file(entry.path()).ok();
                removed += 1;
            }
        }
        info!("Orphan files removed under {}: {removed}", root.display());
    }
    Ok(())
}

/// Canonical form for file-identity comparison; falls back to the absolute
/// join when the file is already gone.
fn resolve(fp: &str) -> PathBuf {
    let path = Path::new(fp);
    path.canonicalize().unwrap_or_else(|_| {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            std::env::current_dir()
                .map(|cwd| cwd.join(path))
                .unwrap_or_else(|_| path.to_path_buf())
        }
    })
}

fn remove_quietly(fp: &str) {
    if !fp.is_empty() {
        std::fs::remove_file(fp).ok();
    }
}
