//! Turning inventory into structures on the grid.

use crate::battle::{BuildingState, OffGridUnits};
use crate::data::SpaceEntityDef;
use crate::diagnostics::Diagnostic;
use crate::grid::Location;
use crate::inventory::{BuildingId, Container, InventoryProvider, ItemRef, UnitCondition};
use crate::layout::{LayoutEngine, LayoutUnit};
use crate::math::{pi, Fixed};
use crate::movement::MoveContext;
use crate::simulation::BattleSimulation;
use crate::structure::{Category, MovementGoal, PlayerId, Side, Structure, StructureId, WeaponPort};

/// A group waiting to be laid out.
#[derive(Debug, Clone)]
pub(crate) struct RosterEntry {
    pub def: SpaceEntityDef,
    pub owner: PlayerId,
    pub item: Option<ItemRef>,
    pub building: Option<BuildingId>,
    pub count: u32,
    /// Front unit condition carried over from earlier battles.
    pub condition: UnitCondition,
}

const fn is_ground_defense(category: Category) -> bool {
    matches!(category, Category::Projector | Category::Shield | Category::Station)
}

impl BattleSimulation {
    /// Read a side's fleets (and the planet, for the defender) into a
    /// roster. Items the catalog does not know are reported and stay out
    /// of the battle.
    pub(crate) fn collect_roster(&mut self, side: Side, world: &dyn InventoryProvider) -> Vec<RosterEntry> {
        let setup = self.battle.setup.side(side).clone();
        let planet = match side {
            Side::Defender => self.battle.setup.planet,
            Side::Attacker => None,
        };
        let mut containers: Vec<Container> = setup.fleets.iter().map(|f| Container::Fleet(*f)).collect();
        if let Some(p) = planet {
            containers.push(Container::Planet(p));
        }

        let mut roster = Vec::new();
        for container in containers {
            let Some(owner) = world.owner(container) else {
                tracing::warn!(%container, ?side, "container not found");
                continue;
            };
            for item in world.items(container) {
                if item.count == 0 {
                    continue;
                }
                let Some(def) = self.catalog.entity(&item.tech_id) else {
                    self.diagnostics.report(
                        self.tick,
                        Diagnostic::MissingEntityDefinition {
                            tech_id: item.tech_id.clone(),
                        },
                    );
                    continue;
                };
                let item_ref = ItemRef {
                    container,
                    item: item.id,
                };
                self.battle.deployed.insert(item_ref, item.count);
                let mut def = def.clone();
                def.weapons.extend(item.slots.iter().cloned());
                roster.push(RosterEntry {
                    def,
                    owner: owner.clone(),
                    item: Some(item_ref),
                    building: None,
                    count: item.count,
                    condition: item.condition(),
                });
            }
        }

        if let Some(p) = planet {
            let owner = world.owner(Container::Planet(p)).unwrap_or_else(|| setup.player.clone());
            for b in world.buildings(p) {
                self.battle.buildings.insert(
                    b.id,
                    BuildingState {
                        tech_id: b.tech_id.clone(),
                        location: b.location,
                        hp: b.hp.max(0),
                        structure: None,
                        destroyed: b.hp <= 0,
                    },
                );
                let def = self
                    .catalog
                    .entity(&b.tech_id)
                    .filter(|d| is_ground_defense(d.category));
                if let (Some(def), true) = (def, b.hp > 0) {
                    roster.push(RosterEntry {
                        def: def.clone(),
                        owner: owner.clone(),
                        item: None,
                        building: Some(b.id),
                        count: 1,
                        condition: UnitCondition {
                            hp: Some(b.hp),
                            shield: None,
                        },
                    });
                }
            }
        }
        roster
    }

    /// Lay out a side's roster and create its structures.
    pub(crate) fn deploy(&mut self, side: Side) {
        let roster = self.rosters[side.index()].clone();
        let template = self
            .battle
            .setup
            .side(side)
            .template
            .as_deref()
            .and_then(|name| self.battle.setup.template(name))
            .cloned();
        let units: Vec<LayoutUnit> = roster
            .iter()
            .map(|e| LayoutUnit {
                tech_id: e.def.tech_id.clone(),
                category: e.def.category,
                count: e.count,
            })
            .collect();
        let report = LayoutEngine::new(&self.grid, &mut self.occupancy).layout_side(side, &units, template.as_ref());

        // Only the first group of a split stack carries the damaged front unit.
        let mut damaged: Vec<bool> = roster.iter().map(|e| e.condition != UnitCondition::default()).collect();
        for placement in &report.placed {
            let condition = if std::mem::take(&mut damaged[placement.source]) {
                roster[placement.source].condition
            } else {
                UnitCondition::default()
            };
            self.spawn_structure(side, &roster[placement.source], condition, placement.cell, placement.count);
        }
        for unplaced in &report.unplaced {
            let entry = &roster[unplaced.source];
            self.diagnostics.report(
                self.tick,
                Diagnostic::PlacementFailed {
                    side,
                    tech_id: entry.def.tech_id.clone(),
                    category: entry.def.category,
                    count: unplaced.count,
                },
            );
            if let Some(item) = entry.item {
                self.battle.unplaced.push(OffGridUnits {
                    side,
                    item,
                    tech_id: entry.def.tech_id.clone(),
                    count: unplaced.count,
                    condition: if std::mem::take(&mut damaged[unplaced.source]) {
                        entry.condition
                    } else {
                        UnitCondition::default()
                    },
                });
            }
        }
        tracing::debug!(
            ?side,
            placed = report.placed.len(),
            unplaced = report.unplaced.len(),
            "side deployed"
        );
    }

    /// Take a side off the grid and lay it out again. Fighter groups split
    /// by the previous template merge back into their roster entry.
    pub(crate) fn redeploy(&mut self, side: Side) {
        let ids: Vec<StructureId> = self
            .registry
            .iter()
            .filter(|s| s.side == side && !s.is_projectile())
            .map(|s| s.id)
            .collect();
        for id in &ids {
            self.registry.remove(*id);
            self.movement.remove_unit(*id);
        }
        for b in self.battle.buildings.values_mut() {
            if b.structure.is_some_and(|s| ids.contains(&s)) {
                b.structure = None;
            }
        }
        self.occupancy.clear_side(side);
        self.battle.unplaced.retain(|u| u.side != side);
        self.deploy(side);
    }

    fn spawn_structure(
        &mut self,
        side: Side,
        entry: &RosterEntry,
        condition: UnitCondition,
        cell: Location,
        count: u32,
    ) -> StructureId {
        let def = &entry.def;
        let ports = def
            .weapons
            .iter()
            .map(|w| WeaponPort::new(w.projectile.clone(), self.catalog.projectile(&w.projectile).cloned(), w.count))
            .collect();
        let hp_max = def.hp.max(1);
        let shield_max = def.shield.max(0);
        let kind = def.category.structure_kind();
        let mobile = def.movement_speed > Fixed::ZERO && !kind.is_planetary();
        let structure = Structure {
            id: StructureId::default(),
            side,
            owner: entry.owner.clone(),
            tech_id: def.tech_id.clone(),
            source: entry.item,
            building: entry.building,
            kind,
            category: def.category,
            position: self.grid.cell_center(cell),
            angle: match side {
                Side::Attacker => Fixed::ZERO,
                Side::Defender => pi(),
            },
            movement_speed: def.movement_speed,
            rotation_time: def.rotation_time,
            hp: condition.hp.unwrap_or(hp_max).clamp(1, hp_max),
            hp_max,
            shield: condition.shield.unwrap_or(shield_max).clamp(0, shield_max),
            shield_max,
            count,
            loss: 0,
            ports,
            attack: None,
            goal: MovementGoal::None,
            guard: self.battle.setup.side(side).guard || !mobile,
            flee: false,
            selected: false,
            direct_control: false,
            kamikaze: def.kamikaze.max(0),
            ecm: def.ecm,
            size: (def.sprite.width, def.sprite.height),
            cell: Some(cell),
            projectile: None,
        };
        let id = self.registry.insert(structure);
        let ctx = MoveContext {
            grid: &self.grid,
            config: &self.config,
        };
        if let Some(unit) = self.registry.get_mut(id) {
            self.movement.register_unit(unit, &ctx);
        }
        if let Some(b) = entry.building.and_then(|b| self.battle.buildings.get_mut(&b)) {
            b.structure = Some(id);
        }
        id
    }
}
