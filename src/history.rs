use anyhow::Result;

use crate::git::CommitId;
use crate::git::GitDriver;

/// A commit that survived the subdirectory rewrite: its subtree (with
/// `.gitrepo` already stripped) actually changed relative to the previous
/// surviving commit.
struct Survivor {
    tree: String,
    message: String,
}

/// Rewrites `parent..head` (or, when `parent` is `None` -- the `.gitrepo`
/// "no parent" sentinel recorded by a `clone` into a repository with no
/// prior HEAD, §8 scenario (a) -- the full ancestry of `head`) into the
/// upstream-equivalent branch described by §4.2.3: commits outside
/// `<subdir>` collapse away, `<subdir>/` becomes the tree root, `.gitrepo` is
/// stripped, and the old pull-base commit itself is excised so the new root
/// is the first genuine subrepo change.
///
/// Returns `Ok(None)` when fewer than two real changes exist in the range
/// ("no new commits", `CODE=-1`).
///
/// The three filters from the Design Notes (parent-drop, subdirectory-root,
/// tree-drop-`.gitrepo`) are fused into one topological walk: for each
/// original commit we decide, using only already-rewritten ancestors held in
/// an `old -> new` map, whether it survives, and if so what its stripped
/// tree looks like. Git objects are only created once, in a second pass,
/// once the pull-base entry has been dropped from the surviving list.
pub fn rewrite_subrepo_history(
    git: &GitDriver,
    subdir: &str,
    parent: Option<&CommitId>,
    head: &CommitId,
) -> Result<Option<CommitId>> {
    let range = match parent {
        Some(parent) => format!("{}..{}", parent.as_str(), head.as_str()),
        None => head.as_str().to_owned(),
    };
    let commits = git.rev_list_topo_reverse(&range)?;
    if commits.len() < 2 {
        return Ok(None);
    }

    let mut survivors: Vec<Survivor> = Vec::new();
    let mut last_tree: Option<String> = None;

    for commit in &commits {
        let Some(subtree) = git.tree_of(commit, Some(subdir))? else {
            continue;
        };
        let stripped = git.tree_without_gitrepo(&subtree)?;
        if last_tree.as_deref() == Some(stripped.as_str()) {
            continue;
        }
        let message = git.commit_message(commit)?;
        last_tree = Some(stripped.clone());
        survivors.push(Survivor {
            tree: stripped,
            message,
        });
    }

    if survivors.len() < 2 {
        return Ok(None);
    }

    // Drop the oldest survivor (the now-rootless former pull base) and
    // re-root the branch at the first genuine subrepo change.
    let mut parents: Vec<CommitId> = Vec::new();
    let mut tip = None;
    for survivor in survivors.into_iter().skip(1) {
        let new_commit = git.commit_tree(&survivor.tree, &parents, &survivor.message)?;
        parents = vec![new_commit.clone()];
        tip = Some(new_commit);
    }

    Ok(tip)
}
