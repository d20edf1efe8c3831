//! Payload assembler: an ordered list of independent field providers.
//!
//! Each provider reads the shared [`PayloadContext`] and writes the fields
//! it declares. A provider that fails (or panics) leaves its fields as
//! [`NOT_AVAILABLE`]; the other providers are unaffected.

use crate::error::{LensError, Result};
use crate::protocol::{DisplayPayload, RegionLabel, TargetSnapshot, NOT_AVAILABLE};
use crate::types::Vec3;
use log::warn;
use std::panic::{catch_unwind, AssertUnwindSafe};

/// Read-only input shared by every provider in one assembly pass.
#[derive(Debug, Clone, Copy)]
pub struct PayloadContext<'a> {
    pub position: Vec3,
    pub region: &'a RegionLabel,
    pub target: &'a TargetSnapshot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadField {
    BlockName,
    OwnerLabel,
    Coords,
    Biome,
    Zone,
    IconId,
}

impl PayloadField {
    fn slot<'p>(&self, payload: &'p mut DisplayPayload) -> &'p mut String {
        match self {
            PayloadField::BlockName => &mut payload.block_name,
            PayloadField::OwnerLabel => &mut payload.owner_label,
            PayloadField::Coords => &mut payload.coords,
            PayloadField::Biome => &mut payload.biome,
            PayloadField::Zone => &mut payload.zone,
            PayloadField::IconId => &mut payload.icon_id,
        }
    }
}

pub trait PayloadProvider: Send + Sync {
    fn name(&self) -> &'static str;

    /// Fields this provider owns.
    fn fields(&self) -> &'static [PayloadField];

    fn contribute(&self, ctx: &PayloadContext<'_>, payload: &mut DisplayPayload) -> Result<()>;
}

// ---------------------------------------------------------------------------
// Assembler
// ---------------------------------------------------------------------------

pub struct PayloadAssembler {
    providers: Vec<Box<dyn PayloadProvider>>,
}

impl PayloadAssembler {
    pub fn new(providers: Vec<Box<dyn PayloadProvider>>) -> Self {
        Self { providers }
    }

    /// Block name, owner, coordinates, region, icon.
    pub fn standard() -> Self {
        Self::new(vec![
            Box::new(BlockNameProvider),
            Box::new(OwnerProvider),
            Box::new(CoordsProvider),
            Box::new(RegionProvider),
            Box::new(IconProvider),
        ])
    }

    pub fn provider_names(&self) -> Vec<&'static str> {
        self.providers.iter().map(|p| p.name()).collect()
    }

    pub fn assemble(&self, ctx: &PayloadContext<'_>) -> DisplayPayload {
        let mut payload = DisplayPayload::default();
        for provider in &self.providers {
            let outcome = catch_unwind(AssertUnwindSafe(|| provider.contribute(ctx, &mut payload)));
            let failure = match outcome {
                Ok(Ok(())) => continue,
                Ok(Err(e)) => e.to_string(),
                Err(_) => format!("provider '{}' panicked", provider.name()),
            };
            warn!("Payload field degraded: {}", failure);
            for field in provider.fields() {
                *field.slot(&mut payload) = NOT_AVAILABLE.to_string();
            }
        }
        payload
    }
}

impl Default for PayloadAssembler {
    fn default() -> Self {
        Self::standard()
    }
}

// ---------------------------------------------------------------------------
// Standard providers
// ---------------------------------------------------------------------------

fn or_na(value: Option<&str>) -> String {
    value.unwrap_or(NOT_AVAILABLE).to_string()
}

pub struct BlockNameProvider;

impl PayloadProvider for BlockNameProvider {
    fn name(&self) -> &'static str {
        "block_name"
    }

    fn fields(&self) -> &'static [PayloadField] {
        &[PayloadField::BlockName]
    }

    fn contribute(&self, ctx: &PayloadContext<'_>, payload: &mut DisplayPayload) -> Result<()> {
        payload.block_name = or_na(ctx.target.display_name.as_deref());
        Ok(())
    }
}

pub struct OwnerProvider;

impl PayloadProvider for OwnerProvider {
    fn name(&self) -> &'static str {
        "owner"
    }

    fn fields(&self) -> &'static [PayloadField] {
        &[PayloadField::OwnerLabel]
    }

    fn contribute(&self, ctx: &PayloadContext<'_>, payload: &mut DisplayPayload) -> Result<()> {
        payload.owner_label = or_na(ctx.target.provenance_label.as_deref());
        Ok(())
    }
}

/// Formats the entity's block position as `x, y, z`.
pub struct CoordsProvider;

impl PayloadProvider for CoordsProvider {
    fn name(&self) -> &'static str {
        "coords"
    }

    fn fields(&self) -> &'static [PayloadField] {
        &[PayloadField::Coords]
    }

    fn contribute(&self, ctx: &PayloadContext<'_>, payload: &mut DisplayPayload) -> Result<()> {
        let p = ctx.position;
        if !(p.x.is_finite() && p.y.is_finite() && p.z.is_finite()) {
            return Err(LensError::Provider {
                provider: self.name(),
                reason: format!("non-finite position {}", p),
            });
        }
        payload.coords = format!("{}, {}, {}", p.x.floor(), p.y.floor(), p.z.floor());
        Ok(())
    }
}

pub struct RegionProvider;

impl PayloadProvider for RegionProvider {
    fn name(&self) -> &'static str {
        "region"
    }

    fn fields(&self) -> &'static [PayloadField] {
        &[PayloadField::Zone, PayloadField::Biome]
    }

    fn contribute(&self, ctx: &PayloadContext<'_>, payload: &mut DisplayPayload) -> Result<()> {
        payload.zone = or_na(ctx.region.zone.as_deref());
        payload.biome = or_na(ctx.region.biome.as_deref());
        Ok(())
    }
}

/// Icon id, empty when nothing is targeted.
pub struct IconProvider;

impl PayloadProvider for IconProvider {
    fn name(&self) -> &'static str {
        "icon"
    }

    fn fields(&self) -> &'static [PayloadField] {
        &[PayloadField::IconId]
    }

    fn contribute(&self, ctx: &PayloadContext<'_>, payload: &mut DisplayPayload) -> Result<()> {
        payload.icon_id = ctx.target.icon_id.clone().unwrap_or_default();
        Ok(())
    }
}
