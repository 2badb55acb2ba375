//! テーブルロー推論器

use crate::abox::ABox;
use crate::branch::{Branch, BranchState, BranchTree};
use crate::completer::{CompleterKind, CompletionContext, ContinuationState};
use crate::config::ReasonerOptions;
use crate::consistency::NodeConsistencyChecker;
use crate::dependency::TermEntry;
use crate::kb::KnowledgeBase;
use crate::node::NodeId;
use crate::ReasonerError;
use fukurow_term::{Name, Role, Term};
use serde_json::json;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info};

/// A completed, clash-free model
#[derive(Debug, Clone)]
pub struct ReasonerResult {
    abox: ABox,
    merge_map: Option<BTreeMap<NodeId, NodeId>>,
}

impl ReasonerResult {
    fn from_branch(branch: Branch) -> Self {
        let merge_tracking = branch.merge_tracking();
        let abox = branch.into_abox();
        let merge_map = merge_tracking.then(|| abox.merge_map());
        Self { abox, merge_map }
    }

    pub fn abox(&self) -> &ABox {
        &self.abox
    }

    pub fn into_abox(self) -> ABox {
        self.abox
    }

    /// Retired node -> node it was merged into; only with merge tracking
    pub fn merge_map(&self) -> Option<&BTreeMap<NodeId, NodeId>> {
        self.merge_map.as_ref()
    }

    pub fn to_json(&self) -> Result<String, ReasonerError> {
        let merge_map: Option<Vec<(NodeId, NodeId)>> = self
            .merge_map
            .as_ref()
            .map(|map| map.iter().map(|(k, v)| (*k, *v)).collect());
        Ok(serde_json::to_string_pretty(&json!({
            "abox": self.abox,
            "merge_map": merge_map,
        }))?)
    }
}

/// Counts rule invocations against the configured ceiling
#[derive(Debug, Clone, Copy, Default)]
pub struct StepCounter {
    limit: Option<usize>,
    steps: usize,
}

impl StepCounter {
    pub fn new(limit: Option<usize>) -> Self {
        Self { limit, steps: 0 }
    }

    pub fn tick(&mut self) -> Result<(), ReasonerError> {
        self.steps += 1;
        match self.limit {
            Some(limit) if self.steps > limit => Err(ReasonerError::StepLimitExceeded(limit)),
            _ => Ok(()),
        }
    }

    pub fn steps(&self) -> usize {
        self.steps
    }
}

/// Tableau reasoner
pub struct Reasoner {
    options: ReasonerOptions,
    checker: NodeConsistencyChecker,
}

impl Reasoner {
    pub fn new() -> Self {
        Self::with_options(ReasonerOptions::default())
    }

    pub fn with_options(options: ReasonerOptions) -> Self {
        Self {
            checker: NodeConsistencyChecker::new(options.trace),
            options,
        }
    }

    pub fn options(&self) -> &ReasonerOptions {
        &self.options
    }

    /// All models of the ABox, or only the first one found
    pub fn check_consistency(
        &self,
        abox: &ABox,
        stop_at_first_model: bool,
    ) -> Result<Vec<ReasonerResult>, ReasonerError> {
        info!(nodes = abox.len(), stop_at_first_model, "checking consistency");
        let results = self.run(abox, stop_at_first_model, |_| Ok(()))?;
        info!(models = results.len(), "consistency check finished");
        Ok(results)
    }

    pub fn is_consistent(&self, abox: &ABox) -> Result<bool, ReasonerError> {
        Ok(!self.check_consistency(abox, true)?.is_empty())
    }

    /// The first model, or `InconsistentABox` if there is none
    pub fn first_model(&self, abox: &ABox) -> Result<ReasonerResult, ReasonerError> {
        self.check_consistency(abox, true)?
            .into_iter()
            .next()
            .ok_or_else(|| ReasonerError::InconsistentABox("no model exists".to_string()))
    }

    /// Whether some individual can satisfy `term` alongside the ABox
    pub fn is_satisfiable(&self, abox: &ABox, term: &Term) -> Result<bool, ReasonerError> {
        info!(%term, "checking satisfiability");
        self.has_model_with(abox, [term.clone()])
    }

    pub fn is_subclass_of(&self, abox: &ABox, sub: &Term, sup: &Term) -> Result<bool, ReasonerError> {
        let (sub, sup) = (sub.normalize(), sup.normalize());
        if sub == sup || sup == Term::Top || sub == Term::Bottom {
            return Ok(true);
        }
        if abox.tbox().told_subsumers(&sub).contains(&sup) {
            return Ok(true);
        }
        info!(%sub, %sup, "checking subsumption");
        Ok(!self.has_model_with(abox, [sub, Term::not(sup)])?)
    }

    /// Whether everything with an `role` successor is a `term`
    pub fn is_in_domain(&self, abox: &ABox, role: &Role, term: &Term) -> Result<bool, ReasonerError> {
        if abox.rbox().domains(role).any(|domain| domain == term) {
            return Ok(true);
        }
        info!(%role, %term, "checking domain");
        let has_successor = Term::some(role.clone(), Term::Top);
        Ok(!self.has_model_with(abox, [has_successor, Term::not(term.clone())])?)
    }

    /// Whether every `role` successor is a `term`
    pub fn is_in_range(&self, abox: &ABox, role: &Role, term: &Term) -> Result<bool, ReasonerError> {
        if abox.rbox().ranges(role).any(|range| range == term) {
            return Ok(true);
        }
        info!(%role, %term, "checking range");
        let outside = Term::some(role.clone(), Term::not(term.clone()));
        Ok(!self.has_model_with(abox, [outside])?)
    }

    pub fn is_disjoint(&self, abox: &ABox, a: &Term, b: &Term) -> Result<bool, ReasonerError> {
        let (a, b) = (a.normalize(), b.normalize());
        if a == Term::Bottom || b == Term::Bottom || a.negate() == b {
            return Ok(true);
        }
        info!(%a, %b, "checking disjointness");
        Ok(!self.has_model_with(abox, [a, b])?)
    }

    /// Whether the named individual is a `term` in every model
    pub fn is_instance_of(
        &self,
        abox: &ABox,
        individual: &Name,
        term: &Term,
    ) -> Result<bool, ReasonerError> {
        info!(%individual, %term, "checking instance");
        let negated = Term::not(term.clone());
        let models = self.run(abox, true, |initial| {
            let node = initial.get_or_add_named_node(individual, false)?;
            initial.add_term(node, negated, [])?;
            Ok(())
        })?;
        Ok(models.is_empty())
    }

    /// Subsumers of every class among `classes`, including itself
    pub fn classify(
        &self,
        abox: &ABox,
        classes: &[Term],
    ) -> Result<BTreeMap<Term, BTreeSet<Term>>, ReasonerError> {
        let mut hierarchy = BTreeMap::new();
        for sub in classes {
            let mut subsumers = BTreeSet::new();
            for sup in classes {
                if self.is_subclass_of(abox, sub, sup)? {
                    subsumers.insert(sup.clone());
                }
            }
            hierarchy.insert(sub.clone(), subsumers);
        }
        Ok(hierarchy)
    }

    pub fn is_knowledge_base_consistent(&self, kb: &KnowledgeBase) -> Result<bool, ReasonerError> {
        match kb.abox() {
            Ok(abox) => self.is_consistent(&abox),
            Err(err) if err.is_clash() => Ok(false),
            Err(err) => Err(err),
        }
    }

    /// One fresh individual carrying all of `terms`
    fn has_model_with(
        &self,
        abox: &ABox,
        terms: impl IntoIterator<Item = Term>,
    ) -> Result<bool, ReasonerError> {
        let models = self.run(abox, true, |initial| {
            let mut node = initial.create_node(false)?;
            for term in terms {
                node = initial.add_term(node, term, [])?.current_node;
            }
            Ok(())
        })?;
        Ok(!models.is_empty())
    }

    /// Copies the ABox, unfolds it, applies `seed` and completes it. A clash
    /// while preparing the copy means there is no model.
    fn run(
        &self,
        abox: &ABox,
        stop_at_first_model: bool,
        seed: impl FnOnce(&mut ABox) -> Result<(), ReasonerError>,
    ) -> Result<Vec<ReasonerResult>, ReasonerError> {
        let mut initial = abox.clone();
        match initial.unfold_all().and_then(|_| seed(&mut initial)) {
            Ok(()) => {}
            Err(err) if err.is_clash() => {
                debug!(error = %err, "query setup is inconsistent");
                return Ok(Vec::new());
            }
            Err(err) => return Err(err),
        }
        let tree = BranchTree::new(Branch::new(initial, self.options.merge_tracking));
        self.complete(tree, stop_at_first_model)
    }

    /// Completes branches depth first until the tree is exhausted, or until
    /// the first model when `stop_at_first_model` is set.
    pub fn complete(
        &self,
        mut tree: BranchTree,
        stop_at_first_model: bool,
    ) -> Result<Vec<ReasonerResult>, ReasonerError> {
        let mut results = Vec::new();
        let mut steps = StepCounter::new(self.options.step_limit);
        let mut processed = 0usize;

        while let Some(mut leaf) = tree.first_leaf() {
            let mut branch = tree
                .take_branch(leaf)
                .ok_or_else(|| ReasonerError::Internal("leaf without a branch".to_string()))?;
            let forks = self.complete_branch(&mut branch, &mut steps)?;
            processed += 1;
            if self.options.progress_logging && processed % 64 == 0 {
                info!(processed, pending = tree.len(), models = results.len(), "reasoning progress");
            }

            if !forks.is_empty() {
                let state = branch.state();
                let alternatives = forks.into_iter().map(|abox| branch.fork(abox)).collect();
                leaf = tree.fork(leaf, branch, alternatives);
                if state == BranchState::Active {
                    continue;
                }
                branch = tree
                    .take_branch(leaf)
                    .ok_or_else(|| ReasonerError::Internal("forked leaf is empty".to_string()))?;
            }

            match branch.state() {
                BranchState::Done => {
                    tree.remove(leaf);
                    results.push(ReasonerResult::from_branch(branch));
                    if stop_at_first_model {
                        break;
                    }
                }
                BranchState::Inconsistent => {
                    let culprits = branch.culprits();
                    debug!(depth = branch.depth(), culprits = culprits.len(), "branch inconsistent");
                    tree.remove(leaf);
                    tree.prune(&culprits);
                }
                BranchState::Active => {
                    return Err(ReasonerError::Internal(
                        "branch stopped while still active".to_string(),
                    ))
                }
            }
        }
        debug!(processed, steps = steps.steps(), "completion finished");
        Ok(results)
    }

    /// Runs the rules on one branch: non-generating rules to a fixed point,
    /// then a single generating step, and again, until nothing is pending
    /// or a clash is found. Returns early with the alternatives when a rule
    /// split the branch; the branch then stays active.
    pub fn complete_branch(
        &self,
        branch: &mut Branch,
        steps: &mut StepCounter,
    ) -> Result<Vec<ABox>, ReasonerError> {
        let mut forks = Vec::new();
        loop {
            while let Some(node) = branch.abox_mut().next_non_generating_node() {
                let (state, clashes) = self.apply(
                    branch.abox_mut(),
                    node,
                    &CompleterKind::NON_GENERATING,
                    steps,
                    &mut forks,
                )?;
                if state == ContinuationState::Inconsistent {
                    branch.mark_inconsistent(clashes);
                    return Ok(forks);
                }
                if !forks.is_empty() {
                    return Ok(forks);
                }
            }

            let mut generated = false;
            while let Some(node) = branch.abox_mut().next_generating_node() {
                let (state, clashes) = self.apply(
                    branch.abox_mut(),
                    node,
                    &CompleterKind::GENERATING,
                    steps,
                    &mut forks,
                )?;
                match state {
                    ContinuationState::Inconsistent => {
                        branch.mark_inconsistent(clashes);
                        return Ok(forks);
                    }
                    ContinuationState::RecheckBranch => {
                        generated = true;
                        break;
                    }
                    _ => {}
                }
            }

            if !generated && !branch.abox().has_pending_work() {
                branch.mark_done();
                return Ok(forks);
            }
        }
    }

    /// Checks the node before every rule and once more at the end.
    fn apply(
        &self,
        abox: &mut ABox,
        node: NodeId,
        kinds: &[CompleterKind],
        steps: &mut StepCounter,
        forks: &mut Vec<ABox>,
    ) -> Result<(ContinuationState, BTreeSet<TermEntry>), ReasonerError> {
        let node = abox.resolve(node);
        if !abox.contains(node) {
            return Ok((ContinuationState::Continue, BTreeSet::new()));
        }
        for kind in kinds {
            steps.tick()?;
            let info = self.checker.check_node(abox, node)?;
            if !info.is_consistent() {
                return Ok((ContinuationState::Inconsistent, info.clashes));
            }

            let mut ctx = CompletionContext::new(abox, self.options.trace);
            let result = kind.complete_node(node, &mut ctx);
            forks.append(&mut ctx.forks);
            let clashes = std::mem::take(&mut ctx.clashes);
            match result {
                Ok(ContinuationState::Inconsistent) => {
                    return Ok((ContinuationState::Inconsistent, clashes))
                }
                Ok(state @ (ContinuationState::RecheckBranch | ContinuationState::Done)) => {
                    return Ok((state, BTreeSet::new()))
                }
                Ok(_) => {}
                Err(err) if err.is_clash() => {
                    if self.options.trace {
                        debug!(%node, rule = ?kind, error = %err, "rule ran into a clash");
                    }
                    return Ok((ContinuationState::Inconsistent, err.clash_entries()));
                }
                Err(err) => return Err(err),
            }
        }
        let info = self.checker.check_node(abox, node)?;
        if info.is_consistent() {
            Ok((ContinuationState::Continue, BTreeSet::new()))
        } else {
            Ok((ContinuationState::Inconsistent, info.clashes))
        }
    }
}

impl Default for Reasoner {
    fn default() -> Self {
        Self::new()
    }
}
