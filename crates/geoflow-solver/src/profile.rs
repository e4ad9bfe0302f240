//! Deployment profile: dense per-region and per-pair tables for evaluation.
//!
//! Built once per solve from the loaded metrics. Every gap in the data is
//! patched here with a documented fallback and recorded as a diagnostic, so
//! the calculator never has to deal with missing values.

use std::collections::BTreeSet;

use tracing::{debug, warn};

use geoflow_core::config::{CarbonSection, PricingSection};
use geoflow_core::{DiagnosticKind, Diagnostics};
use geoflow_store::EgressPricing;

use crate::error::{SolverError, SolverResult};
use crate::indexer::RegionIndexer;
use crate::loader::LoadedMetrics;
use crate::workflow::{Edge, WorkflowModel};

/// A pair of values for the expected and tail passes.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct AvgTail {
    pub avg: f64,
    pub tail: f64,
}

/// Read-only evaluation tables.
#[derive(Debug, Clone)]
pub struct DeploymentProfile {
    regions: usize,
    instances: usize,
    price_gb_s: Vec<f64>,
    invocation_price: Vec<f64>,
    overhead: Vec<f64>,
    grid_carbon: Vec<f64>,
    power: Vec<f64>,
    latency: Vec<AvgTail>,
    egress_price: Vec<f64>,
    transmission_carbon: Vec<f64>,
    runtime: Vec<AvgTail>,
}

impl DeploymentProfile {
    pub fn build(
        loaded: &LoadedMetrics,
        indexer: &RegionIndexer,
        model: &WorkflowModel,
        carbon: &CarbonSection,
        pricing: &PricingSection,
        diagnostics: &mut Diagnostics,
    ) -> SolverResult<Self> {
        let n = indexer.len();
        let used: BTreeSet<usize> = model
            .instances()
            .iter()
            .flat_map(|i| i.allowed.iter().copied())
            .collect();

        let mut profile = Self {
            regions: n,
            instances: model.instance_count(),
            price_gb_s: vec![0.0; n],
            invocation_price: vec![0.0; n],
            overhead: vec![0.0; n],
            grid_carbon: vec![0.0; n],
            power: vec![0.0; n],
            latency: vec![AvgTail::default(); n * n],
            egress_price: vec![0.0; n * n],
            transmission_carbon: vec![0.0; n * n],
            runtime: vec![AvgTail::default(); model.instance_count() * n],
        };

        profile.fill_regions(loaded, indexer, &used, carbon, pricing, diagnostics);
        profile.fill_latency(loaded, indexer, &used, diagnostics);
        profile.fill_egress(loaded, indexer, &used, pricing, diagnostics);
        profile.fill_transmission(loaded, indexer, &used, carbon, diagnostics);
        profile.fill_runtime(loaded, indexer, model, diagnostics)?;

        debug!(regions = n, instances = profile.instances, "deployment profile built");
        Ok(profile)
    }

    fn fill_regions(
        &mut self,
        loaded: &LoadedMetrics,
        indexer: &RegionIndexer,
        used: &BTreeSet<usize>,
        carbon: &CarbonSection,
        pricing: &PricingSection,
        diagnostics: &mut Diagnostics,
    ) {
        for dc in &loaded.datacenters {
            let Some(r) = indexer.index(&dc.id) else {
                continue;
            };
            self.price_gb_s[r] = dc.memory_gb_s_price;
            self.invocation_price[r] = dc.invocation_price;
            if pricing.include_overhead {
                self.overhead[r] = dc.fixed_overhead;
            }

            self.grid_carbon[r] = match loaded.grid_carbon.get(&dc.id) {
                Some(intensity) => *intensity,
                None => {
                    if used.contains(&r) {
                        warn!(region = %dc.id, "no grid carbon data, using world average");
                        diagnostics.record(
                            DiagnosticKind::GridCarbonFallback,
                            dc.id.to_string(),
                            format!(
                                "no grid_carbon row; using world average {} gCO2e/kWh",
                                carbon.world_average_grid_gco2_per_kwh
                            ),
                        );
                    }
                    carbon.world_average_grid_gco2_per_kwh
                }
            };

            self.power[r] = match dc.power_kwh_per_gb_s {
                Some(power) => power,
                None => {
                    if used.contains(&r) {
                        diagnostics.record(
                            DiagnosticKind::PowerDefaulted,
                            dc.id.to_string(),
                            format!(
                                "no power_per_gb_s; using {} kWh/GB-s",
                                carbon.default_power_kwh_per_gb_s
                            ),
                        );
                    }
                    carbon.default_power_kwh_per_gb_s
                }
            };
        }
    }

    fn fill_latency(
        &mut self,
        loaded: &LoadedMetrics,
        indexer: &RegionIndexer,
        used: &BTreeSet<usize>,
        diagnostics: &mut Diagnostics,
    ) {
        let n = self.regions;
        let mut known = vec![None; n * n];
        for ((from, to), link) in &loaded.latencies {
            if let (Some(r), Some(s)) = (indexer.index(from), indexer.index(to)) {
                known[r * n + s] = Some(AvgTail {
                    avg: link.avg,
                    tail: link.tail,
                });
            }
        }

        // Same-region and cross-region pairs each fall back to their own mean.
        let mean_of = |same: bool| {
            let values: Vec<AvgTail> = (0..n * n)
                .filter(|k| (k / n == k % n) == same)
                .filter_map(|k| known[k])
                .collect();
            if values.is_empty() {
                return AvgTail::default();
            }
            let count = values.len() as f64;
            AvgTail {
                avg: values.iter().map(|v| v.avg).sum::<f64>() / count,
                tail: values.iter().map(|v| v.tail).sum::<f64>() / count,
            }
        };
        let same_mean = mean_of(true);
        let cross_mean = mean_of(false);

        let mut estimated = 0usize;
        for r in 0..n {
            for s in 0..n {
                self.latency[r * n + s] = match known[r * n + s] {
                    Some(link) => link,
                    None => {
                        if used.contains(&r) && used.contains(&s) {
                            estimated += 1;
                        }
                        if r == s { same_mean } else { cross_mean }
                    }
                };
            }
        }
        if estimated > 0 {
            diagnostics.record(
                DiagnosticKind::LatencyFallback,
                "network_latency",
                format!("{estimated} region pairs without latency data use the mean of known pairs"),
            );
        }
    }

    fn fill_egress(
        &mut self,
        loaded: &LoadedMetrics,
        indexer: &RegionIndexer,
        used: &BTreeSet<usize>,
        pricing: &PricingSection,
        diagnostics: &mut Diagnostics,
    ) {
        let n = self.regions;
        let volume = pricing.egress_monthly_volume_gb;
        for dc in &loaded.datacenters {
            let Some(r) = indexer.index(&dc.id) else {
                continue;
            };
            let mut gaps = 0usize;
            for (s, target) in indexer.iter() {
                let price = match &dc.egress {
                    None => None,
                    Some(egress) if r == s => Some(egress.intra_region),
                    Some(egress) if dc.id.same_provider(target) => {
                        EgressPricing::band_price(&egress.inter_region, volume)
                    }
                    Some(egress) => EgressPricing::band_price(&egress.inter_provider, volume)
                        .or_else(|| EgressPricing::band_price(&egress.inter_region, volume)),
                };
                if price.is_none() && used.contains(&s) {
                    gaps += 1;
                }
                self.egress_price[r * n + s] = price.unwrap_or(0.0);
            }
            if gaps > 0 && used.contains(&r) {
                diagnostics.record(
                    DiagnosticKind::EgressPricingMissing,
                    dc.id.to_string(),
                    format!("no egress price for {gaps} destinations; charged at 0"),
                );
            }
        }
    }

    fn fill_transmission(
        &mut self,
        loaded: &LoadedMetrics,
        indexer: &RegionIndexer,
        used: &BTreeSet<usize>,
        carbon: &CarbonSection,
        diagnostics: &mut Diagnostics,
    ) {
        let n = self.regions;
        let default_cross = carbon.transmission_kwh_per_gb * carbon.world_average_grid_gco2_per_kwh;
        let mut estimated = 0usize;
        for r in 0..n {
            for s in 0..n {
                let pair = (indexer.region(r).clone(), indexer.region(s).clone());
                self.transmission_carbon[r * n + s] = match loaded.transmission_carbon.get(&pair) {
                    Some(value) => *value,
                    None if r == s => 0.0,
                    None => {
                        if used.contains(&r) && used.contains(&s) {
                            estimated += 1;
                        }
                        default_cross
                    }
                };
            }
        }
        if estimated > 0 {
            diagnostics.record(
                DiagnosticKind::TransmissionCarbonFallback,
                "transmission_carbon",
                format!("{estimated} region pairs use {default_cross} gCO2e/GB"),
            );
        }
    }

    fn fill_runtime(
        &mut self,
        loaded: &LoadedMetrics,
        indexer: &RegionIndexer,
        model: &WorkflowModel,
        diagnostics: &mut Diagnostics,
    ) -> SolverResult<()> {
        let n = self.regions;
        let count = model.instance_count();

        // Recorded (avg, tail-or-avg) per (instance, region).
        let mut known: Vec<Option<AvgTail>> = vec![None; count * n];
        let mut tail_defaulted = vec![0usize; count];
        for (i, instance) in model.instances().iter().enumerate() {
            let Some(per_region) = loaded.statistics.execution.get(&instance.name) else {
                continue;
            };
            for (region, summary) in per_region {
                let (Some(r), Some(avg)) = (indexer.index(region), summary.avg_runtime) else {
                    continue;
                };
                if !avg.is_finite() || avg < 0.0 {
                    return Err(SolverError::config(format!(
                        "instance {:?} has invalid avg_runtime {avg} in {region}",
                        instance.name
                    )));
                }
                let tail = match summary.tail_runtime {
                    Some(tail) if tail.is_finite() && tail >= 0.0 => tail,
                    _ => {
                        if instance.allowed.contains(&r) {
                            tail_defaulted[i] += 1;
                        }
                        avg
                    }
                };
                known[i * n + r] = Some(AvgTail { avg, tail });
            }
        }

        let mean = |values: &mut dyn Iterator<Item = AvgTail>| {
            let (mut sum, mut count) = (AvgTail::default(), 0usize);
            for v in values {
                sum.avg += v.avg;
                sum.tail += v.tail;
                count += 1;
            }
            (count > 0).then(|| AvgTail {
                avg: sum.avg / count as f64,
                tail: sum.tail / count as f64,
            })
        };

        for (i, instance) in model.instances().iter().enumerate() {
            let mut estimated = 0usize;
            for &r in &instance.allowed {
                self.runtime[i * n + r] = match known[i * n + r] {
                    Some(value) => value,
                    None => {
                        let at_region = mean(
                            &mut (0..count).filter(|k| *k != i).filter_map(|k| known[k * n + r]),
                        );
                        let across_regions =
                            || mean(&mut (0..n).filter_map(|s| known[i * n + s]));
                        let value = at_region.or_else(across_regions).ok_or_else(|| {
                            SolverError::config(format!(
                                "no runtime data for instance {:?} in {} and nothing to estimate from",
                                instance.name,
                                indexer.region(r)
                            ))
                        })?;
                        estimated += 1;
                        value
                    }
                };
            }
            if estimated > 0 || tail_defaulted[i] > 0 {
                diagnostics.record(
                    DiagnosticKind::RuntimeFallback,
                    instance.name.clone(),
                    format!(
                        "runtime estimated for {estimated} regions; tail set to average for {} regions",
                        tail_defaulted[i]
                    ),
                );
            }
        }
        Ok(())
    }

    // ── Lookups ────────────────────────────────────────────────────

    pub fn region_count(&self) -> usize {
        self.regions
    }

    pub fn price_gb_s(&self, r: usize) -> f64 {
        self.price_gb_s[r]
    }

    pub fn invocation_price(&self, r: usize) -> f64 {
        self.invocation_price[r]
    }

    pub fn overhead(&self, r: usize) -> f64 {
        self.overhead[r]
    }

    pub fn grid_carbon(&self, r: usize) -> f64 {
        self.grid_carbon[r]
    }

    pub fn power(&self, r: usize) -> f64 {
        self.power[r]
    }

    pub fn egress_price(&self, r: usize, s: usize) -> f64 {
        self.egress_price[r * self.regions + s]
    }

    pub fn transmission_carbon(&self, r: usize, s: usize) -> f64 {
        self.transmission_carbon[r * self.regions + s]
    }

    pub fn runtime(&self, i: usize, r: usize) -> AvgTail {
        self.runtime[i * self.regions + r]
    }

    /// Latency of `edge` between two regions: the edge's own observation
    /// when recorded, else the region-pair table.
    pub fn latency(&self, edge: &Edge, r: usize, s: usize) -> AvgTail {
        let table = self.latency[r * self.regions + s];
        match edge.stats.routes.get(&(r, s)) {
            Some(route) => {
                let avg = route.avg.unwrap_or(table.avg);
                AvgTail {
                    avg,
                    tail: route.tail.unwrap_or(table.tail.max(avg)),
                }
            }
            None => table,
        }
    }
}
