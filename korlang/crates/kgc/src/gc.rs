//! GC Core Module - the collector facade
//!
//! [`GarbageCollector`] owns the heap, the type table and all collector
//! bookkeeping. Every mutation of heap state happens under one world lock,
//! so minor and major cycles are stop-the-world with respect to every other
//! collector call. Old-generation marking can additionally be spread over
//! several calls (`start_incremental_major` / `incremental_mark_step` /
//! `finish_incremental_major`).
//!
//! ## Cycle Phases
//!
//! 1. **Verify**: header checks against the space map (optional)
//! 2. **Mark**: trace from the supplied and installed roots
//! 3. **Finalizer discovery**: divert unreachable finalizable objects
//! 4. **Promote** (minor): move aged survivors, rewrite references
//! 5. **Sweep**: free unmarked memory
//! 6. **Compact** (major): slide the old generation, rebuild remembered set
//!
//! ## Lock Order
//!
//! World lock first, then the type table's read lock. Registration takes only
//! the type table's write lock.

use crate::allocator;
use crate::barrier::{self, references_young, BarrierStats, RememberedSet};
use crate::bridge::{self, Aux, OffHeapHandle};
use crate::config::GcConfig;
use crate::error::{KgcError, Result};
use crate::heap::{load_slot, store_slot, AdaptiveTrigger, Heap};
use crate::logging::{GcEvent, GcLogger};
use crate::marker::roots::ChainedRoots;
use crate::marker::{children, collect_roots, gather_seeds, MarkScope, Marker, RootProvider};
use crate::object::{
    header_of, AuxMode, Generation, ObjectHeader, ObjectRef, TypeId, TypeInfo, TypeTable,
};
use crate::relocate::{self, compact, is_movable, promote_survivors, rewrite_roots, rewrite_slots};
use crate::runtime::{FinalizerQueue, FinalizerState};
use crate::stats::{CycleKind, CycleReport, GcReason, GcStats, GcTimer};
use crate::sweeper::{self, sweep_space};
use crate::util::constants::HIGH_PRESSURE;
use crossbeam::channel::{self, Receiver, Sender, TrySendError};
use indexmap::{IndexMap, IndexSet};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

/// Collector state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum GcState {
    /// No incremental cycle in progress
    Idle,
    /// Incremental old-generation marking in progress
    Marking,
    /// Stopped after detecting heap corruption
    Halted,
}

/// GC health status
#[derive(Debug, Clone, Serialize)]
pub struct GcHealth {
    /// Whether GC is healthy (no critical issues)
    pub healthy: bool,
    pub state: GcState,
    /// Young plus old bytes in use
    pub heap_used: usize,
    /// Young plus old capacity
    pub heap_max: usize,
    /// Heap utilization (0.0 - 1.0)
    pub utilization: f64,
    pub pending_finalizers: usize,
    /// Critical issues found
    pub issues: Vec<String>,
    /// Warnings (non-critical)
    pub warnings: Vec<String>,
}

/// Snapshot of one object's header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObjectInfo {
    pub type_id: TypeId,
    pub size: usize,
    pub generation: Generation,
    pub age: u16,
    pub marked: bool,
    pub pinned: bool,
    pub has_finalizer: bool,
    pub remembered: bool,
    pub user_flags: u16,
}

/// Everything guarded by the world lock
struct World {
    heap: Heap,
    /// Pin request counts; the header's PINNED bit mirrors count > 0
    pins: IndexMap<ObjectRef, u32>,
    finalizers: FinalizerQueue,
    remset: RememberedSet,
    /// Present while an incremental major cycle is marking
    marking: Option<Marker>,
    barrier: BarrierStats,
    /// Provider consulted by every cycle, including allocation-triggered ones
    roots: Option<Box<dyn RootProvider + Send>>,
}

impl World {
    fn validate_roots(&self, roots: &[ObjectRef]) -> Result<()> {
        for &root in roots {
            self.heap.header(root)?;
        }
        Ok(())
    }

    /// Pinned objects by address, then finalizer-held objects in queue order
    fn secondary_roots(&self) -> Vec<ObjectRef> {
        let mut pinned: Vec<ObjectRef> = self.pins.keys().copied().collect();
        pinned.sort_unstable();
        pinned
            .into_iter()
            .chain(self.finalizers.held())
            .filter(|&obj| self.heap.is_object(obj))
            .collect()
    }

    fn clear_marks(&self, scope: MarkScope) {
        sweeper::clear_marks(&self.heap.young);
        if scope == MarkScope::Full {
            sweeper::clear_marks(&self.heap.old);
        }
    }

    /// Fresh full-scope marker with every seed greyed
    fn begin_full_marking(
        &mut self,
        types: &TypeTable,
        config: &GcConfig,
        roots: &mut dyn RootProvider,
    ) -> Result<Marker> {
        if config.verify_heap {
            self.heap.verify(types)?;
        }
        let root_list = collect_roots(roots);
        self.validate_roots(&root_list)?;

        self.clear_marks(MarkScope::Full);
        let mut marker = Marker::new(MarkScope::Full);
        let secondary = self.secondary_roots();
        let seeds = gather_seeds(&self.heap, types, MarkScope::Full, &root_list, &[], &secondary)?;
        marker.seed(&self.heap, &seeds);
        Ok(marker)
    }

    /// Queue unreachable finalizable objects and keep their referents alive
    fn divert_finalizable(&mut self, types: &TypeTable, marker: &mut Marker) -> Result<usize> {
        let mut queued = Vec::new();
        let mut spaces = vec![Generation::Young];
        if marker.scope() == MarkScope::Full {
            spaces.push(Generation::Old);
        }
        for gen in spaces {
            for addr in self.heap.space(gen).objects() {
                let Some(obj) = ObjectRef::from_addr(addr) else {
                    continue;
                };
                // SAFETY: `addr` comes from the space index.
                let header = unsafe { header_of(obj) };
                if header.has_finalizer()
                    && !header.is_marked()
                    && !header.is_pinned()
                    && self.finalizers.state(obj) == FinalizerState::Unfinalized
                {
                    self.finalizers.enqueue(obj)?;
                    queued.push(obj);
                }
            }
        }

        let mut referents = Vec::new();
        for &obj in &queued {
            referents.extend(children(&self.heap, types, obj)?);
        }
        marker.seed(&self.heap, &referents);
        marker.finish(&self.heap, types)?;
        Ok(queued.len())
    }

    /// Reclaimable objects found marked go back to Unfinalized
    fn resurrect_marked(&mut self, marker: &Marker) -> Result<usize> {
        let mut resurrected = 0;
        for obj in self.finalizers.reclaimable() {
            if marker.in_scope(&self.heap, obj) && self.heap.header(obj)?.is_marked() {
                self.finalizers.resurrect(obj)?;
                resurrected += 1;
            }
        }
        Ok(resurrected)
    }

    fn promote(
        &mut self,
        types: &TypeTable,
        config: &GcConfig,
        report: &mut CycleReport,
        roots: &mut dyn RootProvider,
    ) -> Result<()> {
        let promotion = promote_survivors(
            &mut self.heap,
            types,
            &self.finalizers,
            config.promotion_threshold,
        )?;
        let forwarding = &promotion.forwarding;

        if !forwarding.is_empty() {
            rewrite_roots(roots, forwarding);
            let holders: Vec<ObjectRef> = self
                .heap
                .young
                .objects()
                .into_iter()
                .filter_map(ObjectRef::from_addr)
                .chain(forwarding.destinations())
                .chain(self.remset.members())
                .collect();
            rewrite_slots(&self.heap, types, holders, forwarding)?;
            self.finalizers.rewrite(forwarding);

            for promoted in forwarding.destinations() {
                if references_young(&self.heap, types, promoted)? {
                    self.remset.insert(&self.heap, promoted)?;
                }
            }
        }

        report.promoted_objects = forwarding.len();
        report.promoted_bytes = promotion.promoted_bytes;
        report.promotion_failures = promotion.failures;
        Ok(())
    }

    fn compact_old(
        &mut self,
        types: &TypeTable,
        roots: &mut dyn RootProvider,
    ) -> Result<relocate::ForwardingTable> {
        let finalizers = &self.finalizers;
        let forwarding = compact(&mut self.heap.old, |obj| {
            // SAFETY: compaction only asks about indexed, not yet moved objects.
            let header = unsafe { header_of(obj) };
            !is_movable(header, obj, types, finalizers)
        });

        if !forwarding.is_empty() {
            rewrite_roots(roots, &forwarding);
            rewrite_slots(&self.heap, types, relocate::all_objects(&self.heap), &forwarding)?;
            self.finalizers.rewrite(&forwarding);
        }
        Ok(forwarding)
    }

    /// One stop-the-world cycle; `report` names its kind
    fn collect(
        &mut self,
        types: &TypeTable,
        config: &GcConfig,
        report: &mut CycleReport,
        roots: &mut dyn RootProvider,
        logger: &GcLogger,
    ) -> Result<()> {
        let cycle = report.cycle;
        let mut timer = GcTimer::new();
        let phase = |name: &str, timer: &mut GcTimer| {
            let duration_ms = timer.lap_ms();
            log::debug!("cycle {}: {} took {:.3}ms", cycle, name, duration_ms);
            logger.log(GcEvent::PhaseEnd {
                phase: name.to_string(),
                duration_ms,
                cycle,
            });
        };

        let scope = match report.kind {
            CycleKind::Minor => MarkScope::Young,
            CycleKind::Major => MarkScope::Full,
        };

        let resumed = match scope {
            MarkScope::Full => self.marking.take(),
            MarkScope::Young => None,
        };
        let mut marker = match resumed {
            Some(mut marker) => {
                let root_list = collect_roots(roots);
                self.validate_roots(&root_list)?;
                let secondary = self.secondary_roots();
                let seeds =
                    gather_seeds(&self.heap, types, scope, &root_list, &[], &secondary)?;
                marker.seed(&self.heap, &seeds);
                marker
            },
            None if scope == MarkScope::Full => self.begin_full_marking(types, config, roots)?,
            None => {
                if config.verify_heap {
                    self.heap.verify(types)?;
                }
                let root_list = collect_roots(roots);
                self.validate_roots(&root_list)?;
                self.clear_marks(scope);
                let mut marker = Marker::new(scope);
                let remembered = self.remset.members();
                let secondary = self.secondary_roots();
                let seeds =
                    gather_seeds(&self.heap, types, scope, &root_list, &remembered, &secondary)?;
                marker.seed(&self.heap, &seeds);
                marker
            },
        };
        marker.finish(&self.heap, types)?;
        phase("mark", &mut timer);

        report.finalizers_queued = self.divert_finalizable(types, &mut marker)?;
        report.resurrected = self.resurrect_marked(&marker)?;
        report.marked_objects = marker.marked().len();
        drop(marker);
        if report.finalizers_queued > 0 {
            logger.log(GcEvent::FinalizerQueued {
                cycle,
                count: report.finalizers_queued,
            });
        }
        phase("finalizer discovery", &mut timer);

        if report.kind == CycleKind::Minor {
            self.promote(types, config, report, roots)?;
            logger.log(GcEvent::Promotion {
                cycle,
                promoted_objects: report.promoted_objects,
                promoted_bytes: report.promoted_bytes,
                failed: report.promotion_failures,
            });
            phase("promote", &mut timer);
        }

        let mut sweep = sweep_space(&mut self.heap.young, types, &mut self.finalizers)?;
        if report.kind == CycleKind::Major {
            sweep.merge(sweep_space(&mut self.heap.old, types, &mut self.finalizers)?);
        }
        report.reclaimed_objects = sweep.reclaimed_objects;
        report.reclaimed_bytes = sweep.reclaimed_bytes;
        report.detached_off_heap = sweep.detached_off_heap;
        logger.log(GcEvent::Sweep {
            cycle,
            reclaimed_objects: report.reclaimed_objects,
            reclaimed_bytes: report.reclaimed_bytes,
        });
        phase("sweep", &mut timer);

        match report.kind {
            CycleKind::Minor => {
                self.remset.prune(&self.heap, types)?;
            },
            CycleKind::Major => {
                if config.compact_old {
                    let forwarding = self.compact_old(types, roots)?;
                    report.compacted_objects = forwarding.len();
                    logger.log(GcEvent::Compaction {
                        cycle,
                        relocated_objects: forwarding.len(),
                        bytes_moved: forwarding.bytes_moved(),
                    });
                    phase("compact", &mut timer);
                }
                self.remset.rebuild(&self.heap, types)?;
            },
        }

        self.clear_marks(MarkScope::Full);
        Ok(())
    }
}

/// GarbageCollector - generational collector for one heap
///
/// ```rust
/// use kgc::{GarbageCollector, GcConfig, TypeInfo};
///
/// fn main() -> kgc::Result<()> {
///     let gc = GarbageCollector::new(GcConfig::default())?;
///     let node = gc.register_type(TypeInfo::new("node", 16).with_refs(&[0]))?;
///
///     let parent = gc.allocate_type(node)?;
///     let child = gc.allocate_type(node)?;
///     gc.write_ref(parent, 0, Some(child))?;
///
///     let mut roots = vec![parent];
///     let report = gc.collect_minor(&mut roots)?;
///     assert_eq!(report.reclaimed_objects, 0);
///     Ok(())
/// }
/// ```
pub struct GarbageCollector {
    config: Arc<GcConfig>,
    types: RwLock<TypeTable>,
    world: Mutex<World>,
    stats: Arc<GcStats>,
    logger: GcLogger,
    cycle_count: AtomicU64,
    halted: AtomicBool,
    /// Young occupancy that schedules an allocation-time minor cycle
    trigger: AdaptiveTrigger,
    /// Finalizer daemons waiting for newly queued objects
    wakers: Mutex<Vec<Sender<()>>>,
}

impl GarbageCollector {
    /// Create a collector and map both generations
    pub fn new(config: GcConfig) -> Result<Self> {
        config.validate()?;
        let heap = Heap::new(&config)?;
        log::debug!(
            "kgc: young {} bytes, old {} bytes, promotion threshold {}",
            heap.young.capacity(),
            heap.old.capacity(),
            config.promotion_threshold
        );

        let trigger = AdaptiveTrigger::new(
            config.adaptive.clone(),
            config.minor_trigger_bytes(heap.young.capacity()),
            heap.young.capacity(),
        );

        Ok(Self {
            logger: GcLogger::from_global(config.verbose),
            config: Arc::new(config),
            types: RwLock::new(TypeTable::new()),
            world: Mutex::new(World {
                heap,
                pins: IndexMap::new(),
                finalizers: FinalizerQueue::new(),
                remset: RememberedSet::new(),
                marking: None,
                barrier: BarrierStats::default(),
                roots: None,
            }),
            stats: Arc::new(GcStats::new()),
            cycle_count: AtomicU64::new(0),
            halted: AtomicBool::new(false),
            trigger,
            wakers: Mutex::new(Vec::new()),
        })
    }

    // ------------------------------------------------------------------
    // Types
    // ------------------------------------------------------------------

    pub fn register_type(&self, info: TypeInfo) -> Result<TypeId> {
        let id = self.types.write().register(info)?;
        log::trace!("registered type {}", id);
        Ok(id)
    }

    /// Register a new layout replacing `old`; existing instances keep `old`
    pub fn supersede_type(&self, old: TypeId, info: TypeInfo) -> Result<TypeId> {
        self.types.write().supersede(old, info)
    }

    pub fn type_info(&self, type_id: TypeId) -> Result<TypeInfo> {
        self.types.read().get(type_id).cloned()
    }

    // ------------------------------------------------------------------
    // Roots
    // ------------------------------------------------------------------

    /// Install the provider used by every cycle, including the ones
    /// allocation triggers; replaces any previous one
    pub fn set_root_provider(&self, provider: impl RootProvider + Send + 'static) {
        self.world.lock().roots = Some(Box::new(provider));
    }

    pub fn clear_root_provider(&self) -> Option<Box<dyn RootProvider + Send>> {
        self.world.lock().roots.take()
    }

    // ------------------------------------------------------------------
    // Allocation
    // ------------------------------------------------------------------

    /// Allocate a zeroed `size`-byte instance of `type_id` in the young
    /// generation
    ///
    /// With a root provider installed, crossing the minor watermark runs a
    /// minor cycle first, and a failed allocation runs one minor cycle and
    /// retries once.
    pub fn allocate(&self, type_id: TypeId, size: usize) -> Result<ObjectRef> {
        self.ensure_running()?;
        let (footprint, has_finalizer) = {
            let types = self.types.read();
            let info = types.get(type_id)?;
            (allocator::footprint_for(info, size)?, info.has_finalizer)
        };

        let mut world = self.world.lock();
        if allocator::exceeds_capacity(&world.heap.young, footprint) {
            return Err(self.out_of_memory(&world, footprint));
        }
        let trigger = self.trigger.trigger_bytes();
        if world.roots.is_some()
            && allocator::crosses_watermark(&world.heap.young, footprint, trigger)
        {
            self.collect_locked(
                &mut world,
                CycleKind::Minor,
                GcReason::Watermark,
                &mut Vec::<ObjectRef>::new(),
            )?;
        }

        let obj = match allocator::try_allocate(&mut world.heap.young, type_id, size, has_finalizer)
        {
            Some(obj) => obj,
            None => {
                if world.roots.is_some() {
                    self.collect_locked(
                        &mut world,
                        CycleKind::Minor,
                        GcReason::AllocationFailure,
                        &mut Vec::<ObjectRef>::new(),
                    )?;
                }
                allocator::try_allocate(&mut world.heap.young, type_id, size, has_finalizer)
                    .ok_or_else(|| self.out_of_memory(&world, footprint))?
            },
        };

        let World { heap, marking, .. } = &mut *world;
        if let Some(marker) = marking.as_mut() {
            marker.mark_black(heap, obj)?;
        }
        self.stats.record_allocation(footprint);
        Ok(obj)
    }

    /// Allocate an instance of `type_id` with its registered size
    pub fn allocate_type(&self, type_id: TypeId) -> Result<ObjectRef> {
        let size = self.types.read().get(type_id)?.size;
        self.allocate(type_id, size)
    }

    fn out_of_memory(&self, world: &World, requested: usize) -> KgcError {
        let available = world.heap.young.largest_free_block();
        log::warn!(
            "allocation of {} bytes failed, largest free block {} bytes",
            requested,
            available
        );
        self.logger.log(GcEvent::AllocationFailure {
            size: requested,
            largest_free: available,
        });
        KgcError::OutOfMemory {
            requested,
            available,
        }
    }

    // ------------------------------------------------------------------
    // Payload access
    // ------------------------------------------------------------------

    /// Store a reference (or null) into a declared reference slot
    ///
    /// Runs the write barrier: old-to-young stores are remembered, and
    /// during incremental marking a store into a marked object greys the
    /// target.
    pub fn write_ref(&self, obj: ObjectRef, offset: usize, target: Option<ObjectRef>) -> Result<()> {
        let mut world = self.world.lock();
        let types = self.types.read();
        let World {
            heap,
            remset,
            marking,
            barrier: barrier_stats,
            ..
        } = &mut *world;

        check_reference_slot(heap, &types, obj, offset)?;
        if let Some(target) = target {
            heap.header(target)?;
        }
        // SAFETY: the slot is a declared reference slot of a live object.
        unsafe { store_slot(obj, offset, target.map_or(0, ObjectRef::addr)) };
        barrier::post_write(heap, remset, marking.as_mut(), barrier_stats, obj, target)
    }

    /// Load a declared reference slot
    pub fn read_ref(&self, obj: ObjectRef, offset: usize) -> Result<Option<ObjectRef>> {
        let world = self.world.lock();
        let types = self.types.read();
        check_reference_slot(&world.heap, &types, obj, offset)?;
        // SAFETY: the slot is a declared reference slot of a live object.
        let raw = unsafe { load_slot(obj, offset) };
        world.heap.resolve_slot(obj, offset, raw)
    }

    /// Copy `bytes` into the payload; reference slots may not be touched
    pub fn write_bytes(&self, obj: ObjectRef, offset: usize, bytes: &[u8]) -> Result<()> {
        let world = self.world.lock();
        let types = self.types.read();
        check_scalar_range(&world.heap, &types, obj, offset, bytes.len())?;
        // SAFETY: the range lies inside the payload and overlaps no slot.
        unsafe {
            std::ptr::copy_nonoverlapping(
                bytes.as_ptr(),
                (obj.payload_addr() + offset) as *mut u8,
                bytes.len(),
            );
        }
        Ok(())
    }

    /// Copy `len` payload bytes out; reference slots may not be touched
    pub fn read_bytes(&self, obj: ObjectRef, offset: usize, len: usize) -> Result<Vec<u8>> {
        let world = self.world.lock();
        let types = self.types.read();
        check_scalar_range(&world.heap, &types, obj, offset, len)?;
        // SAFETY: the range lies inside the payload and overlaps no slot.
        let bytes =
            unsafe { std::slice::from_raw_parts((obj.payload_addr() + offset) as *const u8, len) };
        Ok(bytes.to_vec())
    }

    // ------------------------------------------------------------------
    // Collection
    // ------------------------------------------------------------------

    /// Collect the young generation
    ///
    /// During incremental marking this finishes the major cycle instead.
    pub fn collect_minor(&self, roots: &mut dyn RootProvider) -> Result<CycleReport> {
        let mut world = self.world.lock();
        self.collect_locked(&mut world, CycleKind::Minor, GcReason::Explicit, roots)
    }

    /// Collect both generations, compacting the old one if configured
    pub fn collect_major(&self, roots: &mut dyn RootProvider) -> Result<CycleReport> {
        let mut world = self.world.lock();
        self.collect_locked(&mut world, CycleKind::Major, GcReason::Explicit, roots)
    }

    /// Mark everything reachable without reclaiming anything
    ///
    /// Returns the marked set in visit order. Marks stay set until the next
    /// cycle starts.
    ///
    /// Besides the roots, the marked set holds ARC objects with a nonzero
    /// count and whatever they reach. Pinned objects and objects held by the
    /// finalizer queue stay unmarked themselves, but their referents are
    /// marked even when no root reaches them, since the next cycle must keep
    /// those referents alive.
    pub fn trace(&self, roots: &mut dyn RootProvider) -> Result<IndexSet<ObjectRef>> {
        self.ensure_running()?;
        let mut world = self.world.lock();
        ensure_idle(&world)?;

        let result = self.with_roots(&mut world, roots, |world, types, roots| {
            let mut marker = world.begin_full_marking(types, &self.config, roots)?;
            marker.finish(&world.heap, types)?;
            Ok(marker.into_marked())
        });
        result.map_err(|e| self.fail(e))
    }

    /// Begin an incremental major cycle: clear marks and grey the roots
    pub fn start_incremental_major(&self, roots: &mut dyn RootProvider) -> Result<()> {
        self.ensure_running()?;
        let mut world = self.world.lock();
        ensure_idle(&world)?;

        let result = self.with_roots(&mut world, roots, |world, types, roots| {
            world.begin_full_marking(types, &self.config, roots)
        });
        let marker = result.map_err(|e| self.fail(e))?;
        world.marking = Some(marker);
        log::debug!("incremental major: marking started");
        Ok(())
    }

    /// Mark up to `budget` objects (0 means the configured budget)
    ///
    /// Returns true once no grey objects remain.
    pub fn incremental_mark_step(&self, budget: usize) -> Result<bool> {
        self.ensure_running()?;
        let budget = if budget == 0 {
            self.config.incremental_budget
        } else {
            budget
        };

        let mut world = self.world.lock();
        let types = self.types.read();
        let World { heap, marking, .. } = &mut *world;
        let marker = marking.as_mut().ok_or_else(|| KgcError::InvalidState {
            expected: "Marking".to_string(),
            actual: "Idle".to_string(),
        })?;
        marker.step(heap, &types, budget).map_err(|e| self.fail(e))
    }

    /// Finish marking, then sweep and compact as a major cycle
    pub fn finish_incremental_major(&self, roots: &mut dyn RootProvider) -> Result<CycleReport> {
        let mut world = self.world.lock();
        if world.marking.is_none() {
            return Err(KgcError::InvalidState {
                expected: "Marking".to_string(),
                actual: "Idle".to_string(),
            });
        }
        self.collect_locked(&mut world, CycleKind::Major, GcReason::Incremental, roots)
    }

    fn collect_locked(
        &self,
        world: &mut World,
        kind: CycleKind,
        reason: GcReason,
        roots: &mut dyn RootProvider,
    ) -> Result<CycleReport> {
        self.ensure_running()?;
        let (kind, reason) = if kind == CycleKind::Minor && world.marking.is_some() {
            log::debug!("minor cycle requested while marking; finishing the major cycle");
            (CycleKind::Major, GcReason::Incremental)
        } else {
            (kind, reason)
        };

        let mut report = self.run_cycle(world, kind, reason, roots)?;

        let triggered = matches!(reason, GcReason::Watermark | GcReason::AllocationFailure);
        if kind == CycleKind::Minor
            && triggered
            && world.heap.old.occupancy() > self.config.major_watermark
        {
            let major = self.run_cycle(world, CycleKind::Major, GcReason::OldWatermark, roots)?;
            report.absorb(major);
        }
        Ok(report)
    }

    fn run_cycle(
        &self,
        world: &mut World,
        kind: CycleKind,
        reason: GcReason,
        roots: &mut dyn RootProvider,
    ) -> Result<CycleReport> {
        let timer = GcTimer::new();
        let cycle = self.cycle_count.fetch_add(1, Ordering::Relaxed) + 1;
        let mut report = CycleReport::new(cycle, kind, reason);
        log::debug!("cycle {}: {} ({})", cycle, kind, reason);
        self.logger.log(GcEvent::CycleStart {
            kind: kind.to_string(),
            reason: reason.to_string(),
            cycle,
        });

        let result = self.with_roots(world, roots, |world, types, roots| {
            world.collect(types, &self.config, &mut report, roots, &self.logger)
        });
        result.map_err(|e| self.fail(e))?;

        report.duration = timer.elapsed();
        self.stats.record_cycle(&report);
        self.logger.log(GcEvent::CycleEnd {
            cycle,
            duration_ms: report.duration.as_secs_f64() * 1000.0,
            reclaimed_bytes: report.reclaimed_bytes,
        });
        let (young_used, old_used) = (world.heap.young.used(), world.heap.old.used());
        let pressure = world.heap.pressure();
        self.logger.log(GcEvent::HeapStats {
            young_used,
            old_used,
            total_bytes: world.heap.young.capacity() + world.heap.old.capacity(),
            utilization: pressure,
        });

        if kind == CycleKind::Minor {
            if let Some(adjustment) = self.trigger.adjust(young_used, pressure) {
                log::debug!(
                    "minor trigger {} -> {} bytes ({} young bytes live)",
                    adjustment.previous,
                    adjustment.current,
                    adjustment.live_bytes
                );
                self.logger.log(GcEvent::TriggerAdjusted {
                    cycle,
                    change: adjustment.change.to_string(),
                    previous_bytes: adjustment.previous,
                    trigger_bytes: adjustment.current,
                    live_bytes: adjustment.live_bytes,
                });
            }
        }

        if report.finalizers_queued > 0 {
            self.notify_finalizers();
        }
        Ok(report)
    }

    /// Run `f` with the caller's roots chained to the installed provider
    fn with_roots<T>(
        &self,
        world: &mut World,
        roots: &mut dyn RootProvider,
        f: impl FnOnce(&mut World, &TypeTable, &mut dyn RootProvider) -> Result<T>,
    ) -> Result<T> {
        let mut installed = world.roots.take();
        let result = {
            let mut chain = ChainedRoots {
                first: roots,
                second: installed.as_mut(),
            };
            let types = self.types.read();
            f(world, &types, &mut chain)
        };
        world.roots = installed;
        result
    }

    fn ensure_running(&self) -> Result<()> {
        if self.halted.load(Ordering::Acquire) {
            return Err(KgcError::CollectorHalted);
        }
        Ok(())
    }

    /// Halt on corruption; every error passes through unchanged
    fn fail(&self, err: KgcError) -> KgcError {
        if let KgcError::CorruptHeader { address, reason } = &err {
            self.halted.store(true, Ordering::Release);
            log::error!("heap corruption at {:#x}: {}; collector halted", address, reason);
            self.logger.log(GcEvent::HeapCorruption {
                address: *address,
                reason: reason.clone(),
            });
        }
        err
    }

    /// Check every header; corruption halts the collector
    pub fn verify_heap(&self) -> Result<()> {
        self.ensure_running()?;
        let world = self.world.lock();
        let types = self.types.read();
        world.heap.verify(&types).map_err(|e| self.fail(e))
    }

    // ------------------------------------------------------------------
    // Finalization
    // ------------------------------------------------------------------

    /// Hand out the oldest queued object, now Finalizing
    pub fn next_finalizable(&self) -> Option<ObjectRef> {
        self.world.lock().finalizers.next()
    }

    /// Finalizing -> Reclaimable
    pub fn complete_finalization(&self, obj: ObjectRef) -> Result<()> {
        self.world.lock().finalizers.complete(obj)?;
        self.stats.record_finalizer_completed();
        Ok(())
    }

    /// Finalize every queued object with `finalize`; returns how many ran
    ///
    /// `finalize` runs without the world lock held.
    pub fn run_finalizers(&self, mut finalize: impl FnMut(ObjectRef)) -> Result<usize> {
        let mut count = 0;
        while let Some(obj) = self.next_finalizable() {
            finalize(obj);
            self.complete_finalization(obj)?;
            count += 1;
        }
        Ok(count)
    }

    pub fn pending_finalizers(&self) -> usize {
        self.world.lock().finalizers.pending_count()
    }

    pub fn finalizer_state(&self, obj: ObjectRef) -> FinalizerState {
        self.world.lock().finalizers.state(obj)
    }

    /// Channel signalled after each cycle that queued finalizers
    pub fn subscribe_finalizer_wakeups(&self) -> Receiver<()> {
        let (tx, rx) = channel::bounded(1);
        self.wakers.lock().push(tx);
        rx
    }

    fn notify_finalizers(&self) {
        self.wakers
            .lock()
            .retain(|tx| !matches!(tx.try_send(()), Err(TrySendError::Disconnected(_))));
    }

    // ------------------------------------------------------------------
    // ARC / off-heap bridge
    // ------------------------------------------------------------------

    /// Increment an ARC object's count; returns the new count
    pub fn retain(&self, obj: ObjectRef) -> Result<u64> {
        self.with_aux(obj, bridge::retain)
    }

    /// Decrement an ARC object's count; returns the new count
    pub fn release(&self, obj: ObjectRef) -> Result<u64> {
        self.with_aux(obj, |header, mode| bridge::release(obj, header, mode))
    }

    /// Attach (or clear) an off-heap handle; returns the previous one
    pub fn set_off_heap(
        &self,
        obj: ObjectRef,
        handle: Option<OffHeapHandle>,
    ) -> Result<Option<OffHeapHandle>> {
        self.with_aux(obj, |header, mode| bridge::set_off_heap(header, mode, handle))
    }

    /// Typed view of the `aux` word
    pub fn aux(&self, obj: ObjectRef) -> Result<Aux> {
        self.with_aux(obj, |header, mode| Ok(Aux::read(header, mode)))
    }

    fn with_aux<T>(
        &self,
        obj: ObjectRef,
        f: impl FnOnce(&ObjectHeader, AuxMode) -> Result<T>,
    ) -> Result<T> {
        let world = self.world.lock();
        let header = world.heap.header(obj)?;
        let mode = self.types.read().get(header.type_id())?.aux_mode;
        f(header, mode)
    }

    // ------------------------------------------------------------------
    // Pinning and header bits
    // ------------------------------------------------------------------

    /// Add a pin request; returns the new pin count
    pub fn pin(&self, obj: ObjectRef) -> Result<u32> {
        let mut world = self.world.lock();
        world.heap.header(obj)?.set_pinned(true);
        let count = world.pins.entry(obj).or_insert(0);
        *count += 1;
        Ok(*count)
    }

    /// Drop a pin request; returns the remaining count
    pub fn unpin(&self, obj: ObjectRef) -> Result<u32> {
        let mut world = self.world.lock();
        let header = world.heap.header(obj)?;
        if !header.is_pinned() {
            return Err(KgcError::NotPinned { address: obj.addr() });
        }
        let remaining = match world.pins.get_mut(&obj) {
            Some(count) => {
                *count -= 1;
                *count
            },
            None => return Err(KgcError::NotPinned { address: obj.addr() }),
        };
        if remaining == 0 {
            world.pins.shift_remove(&obj);
            world.heap.header(obj)?.set_pinned(false);
        }
        Ok(remaining)
    }

    /// Replace the runtime-owned header bits (16-31)
    pub fn set_user_flags(&self, obj: ObjectRef, bits: u16) -> Result<()> {
        self.world.lock().heap.header(obj)?.set_user_flags(bits);
        Ok(())
    }

    pub fn user_flags(&self, obj: ObjectRef) -> Result<u16> {
        Ok(self.world.lock().heap.header(obj)?.user_flags())
    }

    // ------------------------------------------------------------------
    // Inspection
    // ------------------------------------------------------------------

    #[inline]
    pub fn is_live(&self, obj: ObjectRef) -> bool {
        self.world.lock().heap.is_object(obj)
    }

    /// Header snapshot of a live object
    pub fn inspect(&self, obj: ObjectRef) -> Result<ObjectInfo> {
        let world = self.world.lock();
        let header = world.heap.header(obj)?;
        let generation = header.generation().ok_or_else(|| {
            KgcError::corrupt(obj.addr(), format!("gen {}", header.raw_generation()))
        })?;
        Ok(ObjectInfo {
            type_id: header.type_id(),
            size: header.size(),
            generation,
            age: header.age(),
            marked: header.is_marked(),
            pinned: header.is_pinned(),
            has_finalizer: header.has_finalizer(),
            remembered: header.is_remembered(),
            user_flags: header.user_flags(),
        })
    }

    /// Objects currently allocated in both generations
    pub fn object_count(&self) -> usize {
        let world = self.world.lock();
        world.heap.young.object_count() + world.heap.old.object_count()
    }

    /// Young plus old occupancy (0.0 - 1.0)
    pub fn pressure(&self) -> f64 {
        self.world.lock().heap.pressure()
    }

    pub fn is_under_high_pressure(&self) -> bool {
        self.pressure() > HIGH_PRESSURE
    }

    /// Young occupancy in bytes at which allocation runs a minor cycle
    ///
    /// Starts at `minor_watermark` of the young capacity and is retuned
    /// after every minor cycle.
    pub fn minor_trigger_bytes(&self) -> usize {
        self.trigger.trigger_bytes()
    }

    pub fn barrier_stats(&self) -> BarrierStats {
        self.world.lock().barrier
    }

    pub fn state(&self) -> GcState {
        if self.halted.load(Ordering::Acquire) {
            GcState::Halted
        } else if self.world.lock().marking.is_some() {
            GcState::Marking
        } else {
            GcState::Idle
        }
    }

    /// Check GC health status
    pub fn health_check(&self) -> GcHealth {
        let state = self.state();
        let world = self.world.lock();
        let heap_used = world.heap.young.used() + world.heap.old.used();
        let heap_max = world.heap.young.capacity() + world.heap.old.capacity();
        let utilization = world.heap.pressure();

        let mut issues = Vec::new();
        let mut warnings = Vec::new();

        if state == GcState::Halted {
            issues.push("Collector halted after heap corruption".to_string());
        }
        if utilization > 0.9 {
            issues.push("Heap utilization critically high (>90%)".to_string());
        } else if utilization > 0.75 {
            warnings.push("Heap utilization high (>75%)".to_string());
        }
        if state == GcState::Marking {
            warnings.push("Incremental marking in progress".to_string());
        }
        if world.finalizers.pending_count() > 0 && self.wakers.lock().is_empty() {
            warnings.push(format!(
                "{} finalizers pending with no daemon attached",
                world.finalizers.pending_count()
            ));
        }

        GcHealth {
            healthy: issues.is_empty(),
            state,
            heap_used,
            heap_max,
            utilization,
            pending_finalizers: world.finalizers.pending_count(),
            issues,
            warnings,
        }
    }

    /// Get detailed diagnostic information
    pub fn diagnostics(&self) -> IndexMap<String, String> {
        let mut diagnostics = IndexMap::new();
        diagnostics.insert("state".to_string(), format!("{:?}", self.state()));
        diagnostics.insert("cycle_count".to_string(), self.cycle_count().to_string());

        let world = self.world.lock();
        let heap = &world.heap;
        for space in [&heap.young, &heap.old] {
            let gen = space.generation();
            diagnostics.insert(format!("{}_used", gen), space.used().to_string());
            diagnostics.insert(format!("{}_capacity", gen), space.capacity().to_string());
            diagnostics.insert(format!("{}_objects", gen), space.object_count().to_string());
        }
        diagnostics.insert(
            "heap_utilization".to_string(),
            format!("{:.2}", heap.pressure()),
        );
        diagnostics.insert("remembered".to_string(), world.remset.len().to_string());
        diagnostics.insert("pinned".to_string(), world.pins.len().to_string());
        diagnostics.insert(
            "pending_finalizers".to_string(),
            world.finalizers.pending_count().to_string(),
        );
        diagnostics.insert("barrier_stores".to_string(), world.barrier.stores.to_string());
        diagnostics.insert(
            "minor_trigger".to_string(),
            self.trigger.trigger_bytes().to_string(),
        );
        diagnostics.insert(
            "trigger_adjustments".to_string(),
            self.trigger.adjustments().to_string(),
        );
        diagnostics.insert(
            "root_provider".to_string(),
            world.roots.is_some().to_string(),
        );
        diagnostics.insert("types".to_string(), self.types.read().len().to_string());
        diagnostics
    }

    pub fn stats(&self) -> Arc<GcStats> {
        Arc::clone(&self.stats)
    }

    pub fn logger(&self) -> &GcLogger {
        &self.logger
    }

    pub fn config(&self) -> &GcConfig {
        &self.config
    }

    /// Get total GC cycles executed
    pub fn cycle_count(&self) -> u64 {
        self.cycle_count.load(Ordering::Relaxed)
    }
}

impl std::fmt::Debug for GarbageCollector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GarbageCollector")
            .field("state", &self.state())
            .field("cycle_count", &self.cycle_count())
            .finish()
    }
}

fn ensure_idle(world: &World) -> Result<()> {
    if world.marking.is_some() {
        return Err(KgcError::InvalidState {
            expected: "Idle".to_string(),
            actual: "Marking".to_string(),
        });
    }
    Ok(())
}

fn check_reference_slot(heap: &Heap, types: &TypeTable, obj: ObjectRef, offset: usize) -> Result<()> {
    let header = heap.header(obj)?;
    let info = types.get(header.type_id())?;
    if !info.refs.is_reference(offset) {
        return Err(KgcError::InvalidArgument(format!(
            "offset {} of {} is not a reference slot",
            offset, info.name
        )));
    }
    Ok(())
}

fn check_scalar_range(
    heap: &Heap,
    types: &TypeTable,
    obj: ObjectRef,
    offset: usize,
    len: usize,
) -> Result<()> {
    let header = heap.header(obj)?;
    let end = offset.checked_add(len).filter(|&end| end <= header.size());
    if end.is_none() {
        return Err(KgcError::InvalidArgument(format!(
            "range {}+{} outside payload of {} bytes",
            offset,
            len,
            header.size()
        )));
    }
    let info = types.get(header.type_id())?;
    if info.refs.overlaps(offset, len) {
        return Err(KgcError::InvalidArgument(format!(
            "range {}+{} overlaps a reference slot of {}",
            offset, len, info.name
        )));
    }
    Ok(())
}
