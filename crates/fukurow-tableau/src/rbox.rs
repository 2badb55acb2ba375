//! ロール階層 (RBox)

use crate::ReasonerError;
use fukurow_term::{Role, Term};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RoleKind {
    #[default]
    Object,
    Data,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RoleFlags {
    pub functional: bool,
    pub inverse_functional: bool,
    pub transitive: bool,
    pub symmetric: bool,
}

impl RoleFlags {
    fn union(self, other: RoleFlags) -> RoleFlags {
        RoleFlags {
            functional: self.functional || other.functional,
            inverse_functional: self.inverse_functional || other.inverse_functional,
            transitive: self.transitive || other.transitive,
            symmetric: self.symmetric || other.symmetric,
        }
    }

    /// Flags a role inherits from its inverse
    fn inverted(self) -> RoleFlags {
        RoleFlags {
            functional: self.inverse_functional,
            inverse_functional: self.functional,
            ..self
        }
    }
}

/// Role axioms as stated, before closure.
#[derive(Debug, Clone, Default)]
pub struct AssertedRBox {
    kinds: BTreeMap<Role, RoleKind>,
    flags: BTreeMap<Role, RoleFlags>,
    inverses: BTreeSet<(Role, Role)>,
    equivalents: BTreeSet<(Role, Role)>,
    sub_roles: BTreeSet<(Role, Role)>,
    domains: BTreeMap<Role, BTreeSet<Term>>,
    ranges: BTreeMap<Role, BTreeSet<Term>>,
}

impl AssertedRBox {
    fn roles(&self) -> BTreeSet<Role> {
        let mut roles: BTreeSet<Role> = self.kinds.keys().cloned().collect();
        roles.extend(self.flags.keys().cloned());
        roles.extend(self.domains.keys().cloned());
        roles.extend(self.ranges.keys().cloned());
        for (a, b) in self
            .inverses
            .iter()
            .chain(&self.equivalents)
            .chain(&self.sub_roles)
        {
            roles.insert(a.clone());
            roles.insert(b.clone());
        }
        roles
    }

    fn flags_mut(&mut self, role: Role) -> &mut RoleFlags {
        self.flags.entry(role).or_default()
    }
}

/// Closed view of a single role
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoleInfo {
    pub kind: RoleKind,
    pub flags: RoleFlags,
    pub inverses: BTreeSet<Role>,
    pub equivalents: BTreeSet<Role>,
    /// Transitive, excluding the role itself
    pub sub_roles: BTreeSet<Role>,
    /// Transitive, excluding the role itself
    pub super_roles: BTreeSet<Role>,
    /// Including those of super-roles and inverse ranges
    pub domains: BTreeSet<Term>,
    /// Including those of super-roles and inverse domains
    pub ranges: BTreeSet<Term>,
}

/// Role box: the asserted axioms plus their fixed-point closure.
///
/// Every mutator recomputes the closure. A mutation that makes the closure
/// contradictory is rejected and leaves the RBox unchanged.
#[derive(Debug, Clone, Default)]
pub struct RBox {
    asserted: AssertedRBox,
    roles: BTreeMap<Role, RoleInfo>,
    has_inverse_roles: bool,
}

impl RBox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn asserted(&self) -> &AssertedRBox {
        &self.asserted
    }

    pub fn declare_role(&mut self, role: Role, kind: RoleKind) -> Result<(), ReasonerError> {
        self.update(|a| {
            a.kinds.insert(role, kind);
        })
    }

    pub fn add_sub_role(&mut self, sub: Role, sup: Role) -> Result<(), ReasonerError> {
        self.update(|a| {
            a.sub_roles.insert((sub, sup));
        })
    }

    pub fn add_equivalent_roles(&mut self, a: Role, b: Role) -> Result<(), ReasonerError> {
        self.update(|asserted| {
            asserted.equivalents.insert((a, b));
        })
    }

    pub fn add_inverse_roles(&mut self, a: Role, b: Role) -> Result<(), ReasonerError> {
        self.update(|asserted| {
            asserted.inverses.insert((a, b));
        })
    }

    pub fn set_functional(&mut self, role: Role) -> Result<(), ReasonerError> {
        self.update(|a| a.flags_mut(role).functional = true)
    }

    pub fn set_inverse_functional(&mut self, role: Role) -> Result<(), ReasonerError> {
        self.update(|a| a.flags_mut(role).inverse_functional = true)
    }

    pub fn set_transitive(&mut self, role: Role) -> Result<(), ReasonerError> {
        self.update(|a| a.flags_mut(role).transitive = true)
    }

    pub fn set_symmetric(&mut self, role: Role) -> Result<(), ReasonerError> {
        self.update(|a| a.flags_mut(role).symmetric = true)
    }

    pub fn add_domain(&mut self, role: Role, term: Term) -> Result<(), ReasonerError> {
        self.update(|a| {
            a.domains.entry(role).or_default().insert(term);
        })
    }

    pub fn add_range(&mut self, role: Role, term: Term) -> Result<(), ReasonerError> {
        self.update(|a| {
            a.ranges.entry(role).or_default().insert(term);
        })
    }

    fn update(&mut self, change: impl FnOnce(&mut AssertedRBox)) -> Result<(), ReasonerError> {
        let mut asserted = self.asserted.clone();
        change(&mut asserted);
        let roles = close(&asserted)?;
        self.has_inverse_roles = roles
            .values()
            .any(|info| !info.inverses.is_empty() || info.flags.symmetric);
        self.asserted = asserted;
        self.roles = roles;
        Ok(())
    }

    pub fn role(&self, role: &Role) -> Option<&RoleInfo> {
        self.roles.get(role)
    }

    pub fn roles(&self) -> impl Iterator<Item = (&Role, &RoleInfo)> + '_ {
        self.roles.iter()
    }

    pub fn kind(&self, role: &Role) -> RoleKind {
        self.role(role).map(|info| info.kind).unwrap_or_default()
    }

    fn flags(&self, role: &Role) -> RoleFlags {
        self.role(role).map(|info| info.flags).unwrap_or_default()
    }

    pub fn is_functional(&self, role: &Role) -> bool {
        self.flags(role).functional
    }

    pub fn is_inverse_functional(&self, role: &Role) -> bool {
        self.flags(role).inverse_functional
    }

    pub fn is_transitive(&self, role: &Role) -> bool {
        self.flags(role).transitive
    }

    pub fn is_symmetric(&self, role: &Role) -> bool {
        self.flags(role).symmetric
    }

    pub fn inverses<'a>(&'a self, role: &Role) -> impl Iterator<Item = &'a Role> + 'a {
        self.role(role).into_iter().flat_map(|info| info.inverses.iter())
    }

    pub fn domains<'a>(&'a self, role: &Role) -> impl Iterator<Item = &'a Term> + 'a {
        self.role(role).into_iter().flat_map(|info| info.domains.iter())
    }

    pub fn ranges<'a>(&'a self, role: &Role) -> impl Iterator<Item = &'a Term> + 'a {
        self.role(role).into_iter().flat_map(|info| info.ranges.iter())
    }

    /// The role followed by all of its sub-roles
    pub fn sub_roles_inclusive(&self, role: &Role) -> Vec<Role> {
        let mut roles = vec![role.clone()];
        if let Some(info) = self.role(role) {
            roles.extend(info.sub_roles.iter().cloned());
        }
        roles
    }

    /// The role followed by all of its super-roles
    pub fn super_roles_inclusive(&self, role: &Role) -> Vec<Role> {
        let mut roles = vec![role.clone()];
        if let Some(info) = self.role(role) {
            roles.extend(info.super_roles.iter().cloned());
        }
        roles
    }

    pub fn is_sub_role_of(&self, sub: &Role, sup: &Role) -> bool {
        sub == sup
            || self
                .role(sub)
                .map_or(false, |info| info.super_roles.contains(sup))
    }

    pub fn transitive_roles(&self) -> impl Iterator<Item = &Role> + '_ {
        self.roles
            .iter()
            .filter(|(_, info)| info.flags.transitive)
            .map(|(role, _)| role)
    }

    /// True when inverse or symmetric roles exist.
    pub fn has_inverse_roles(&self) -> bool {
        self.has_inverse_roles
    }
}

fn close(asserted: &AssertedRBox) -> Result<BTreeMap<Role, RoleInfo>, ReasonerError> {
    let all = asserted.roles();

    let mut sub: BTreeSet<(Role, Role)> = asserted.sub_roles.clone();
    for (a, b) in &asserted.equivalents {
        sub.insert((a.clone(), b.clone()));
        sub.insert((b.clone(), a.clone()));
    }
    let mut inverses: BTreeMap<Role, BTreeSet<Role>> = BTreeMap::new();
    for (a, b) in &asserted.inverses {
        inverses.entry(a.clone()).or_default().insert(b.clone());
        inverses.entry(b.clone()).or_default().insert(a.clone());
    }

    loop {
        let mut derived_sub = Vec::new();
        let mut derived_inverses = Vec::new();
        let edges: Vec<(Role, Role)> = sub.iter().cloned().collect();

        for (a, b) in &edges {
            for (c, d) in &edges {
                if b == c && a != d {
                    derived_sub.push((a.clone(), d.clone()));
                }
            }
            for ia in inverses.get(a).into_iter().flatten() {
                for ib in inverses.get(b).into_iter().flatten() {
                    if ia != ib {
                        derived_sub.push((ia.clone(), ib.clone()));
                    }
                }
            }
            if sub.contains(&(b.clone(), a.clone())) {
                for x in inverses.get(a).into_iter().flatten() {
                    derived_inverses.push((b.clone(), x.clone()));
                }
            }
        }
        for invs in inverses.values() {
            for y in invs {
                for z in invs {
                    if y != z {
                        derived_sub.push((y.clone(), z.clone()));
                    }
                }
            }
        }

        let mut changed = false;
        for edge in derived_sub {
            changed |= sub.insert(edge);
        }
        for (a, b) in derived_inverses {
            changed |= inverses.entry(a.clone()).or_default().insert(b.clone());
            changed |= inverses.entry(b).or_default().insert(a);
        }
        if !changed {
            break;
        }
    }

    for (a, b) in &sub {
        if let (Some(ka), Some(kb)) = (asserted.kinds.get(a), asserted.kinds.get(b)) {
            if ka != kb {
                return Err(ReasonerError::InconsistentRBox(format!(
                    "role {} and its super-role {} mix object and data properties",
                    a, b
                )));
            }
        }
    }

    let mut roles: BTreeMap<Role, RoleInfo> = BTreeMap::new();
    for role in &all {
        let sub_roles: BTreeSet<Role> = sub
            .iter()
            .filter(|(a, b)| b == role && a != role)
            .map(|(a, _)| a.clone())
            .collect();
        let super_roles: BTreeSet<Role> = sub
            .iter()
            .filter(|(a, b)| a == role && b != role)
            .map(|(_, b)| b.clone())
            .collect();
        let equivalents = sub_roles.intersection(&super_roles).cloned().collect();
        let related_data = sub_roles
            .iter()
            .chain(&super_roles)
            .any(|r| asserted.kinds.get(r) == Some(&RoleKind::Data));
        let kind = match asserted.kinds.get(role) {
            Some(kind) => *kind,
            None if related_data => RoleKind::Data,
            None => RoleKind::Object,
        };
        roles.insert(
            role.clone(),
            RoleInfo {
                kind,
                flags: asserted.flags.get(role).copied().unwrap_or_default(),
                inverses: inverses.get(role).cloned().unwrap_or_default(),
                equivalents,
                sub_roles,
                super_roles,
                ..RoleInfo::default()
            },
        );
    }

    propagate_flags(&mut roles);

    let snapshot = roles.clone();
    for (role, info) in roles.iter_mut() {
        for source in std::iter::once(role).chain(&snapshot[role].super_roles) {
            if let Some(domains) = asserted.domains.get(source) {
                info.domains.extend(domains.iter().cloned());
            }
            if let Some(ranges) = asserted.ranges.get(source) {
                info.ranges.extend(ranges.iter().cloned());
            }
            for inverse in snapshot.get(source).into_iter().flat_map(|i| &i.inverses) {
                if let Some(ranges) = asserted.ranges.get(inverse) {
                    info.domains.extend(ranges.iter().cloned());
                }
                if let Some(domains) = asserted.domains.get(inverse) {
                    info.ranges.extend(domains.iter().cloned());
                }
            }
        }
    }

    for (role, info) in &roles {
        if let Some(other) = info.inverses.intersection(&info.equivalents).next() {
            return Err(ReasonerError::InconsistentRBox(format!(
                "role {} is both equivalent and inverse to {}",
                role, other
            )));
        }
        if info.flags.functional && info.flags.transitive {
            return Err(ReasonerError::InconsistentRBox(format!(
                "role {} cannot be both functional and transitive",
                role
            )));
        }
        if info.kind == RoleKind::Data {
            let offending = if !info.inverses.is_empty() {
                Some("an inverse")
            } else if info.flags.transitive {
                Some("transitive")
            } else if info.flags.symmetric {
                Some("symmetric")
            } else if info.flags.inverse_functional {
                Some("inverse-functional")
            } else {
                None
            };
            if let Some(what) = offending {
                return Err(ReasonerError::InconsistentRBox(format!(
                    "data property {} cannot be {}",
                    role, what
                )));
            }
        }
    }

    Ok(roles)
}

/// Fixed point over super-roles, equivalents and inverses.
fn propagate_flags(roles: &mut BTreeMap<Role, RoleInfo>) {
    loop {
        let snapshot = roles.clone();
        let mut changed = false;
        for (role, info) in roles.iter_mut() {
            let mut flags = info.flags;
            for sup in &info.super_roles {
                if let Some(other) = snapshot.get(sup) {
                    flags = flags.union(other.flags);
                }
            }
            for inverse in &info.inverses {
                if let Some(other) = snapshot.get(inverse) {
                    flags = flags.union(other.flags.inverted());
                }
            }
            if flags != snapshot[role].flags {
                info.flags = flags;
                changed = true;
            }
        }
        if !changed {
            break;
        }
    }
}
