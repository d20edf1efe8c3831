//! Sandbox terrain: seeded column heights and a chunk cache whose resident
//! chunks are the world's loaded regions.

use crate::types::RegionKey;
use parking_lot::RwLock;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::Arc;

// ---------------------------------------------------------------------------
// Height chunk
// ---------------------------------------------------------------------------

/// Surface heights of one `size × size` column chunk, row-major in z.
pub struct HeightChunk {
    pub heights: Vec<i32>,
    pub size: i32,
    pub origin_x: i32,
    pub origin_z: i32,
}

impl HeightChunk {
    pub fn height_at(&self, x: i32, z: i32) -> Option<i32> {
        let lx = x - self.origin_x;
        let lz = z - self.origin_z;
        if lx < 0 || lz < 0 || lx >= self.size || lz >= self.size {
            return None;
        }
        self.heights.get((lz * self.size + lx) as usize).copied()
    }
}

// ---------------------------------------------------------------------------
// Heightmap terrain
// ---------------------------------------------------------------------------

pub struct HeightmapTerrain {
    pub seed: u64,
    /// Width of a chunk in blocks.
    pub chunk_size: i32,
    /// Mean surface height.
    pub base_height: i32,
    cache: RwLock<HashMap<(i32, i32), Arc<HeightChunk>>>,
}

impl HeightmapTerrain {
    pub fn new(seed: u64, chunk_size: i32, base_height: i32) -> Self {
        Self {
            seed,
            chunk_size: chunk_size.max(1),
            base_height,
            cache: RwLock::new(HashMap::new()),
        }
    }

    pub fn chunk_coord(&self, x: i32, z: i32) -> (i32, i32) {
        (x.div_euclid(self.chunk_size), z.div_euclid(self.chunk_size))
    }

    pub fn region_of(&self, x: i32, z: i32) -> RegionKey {
        let (cx, cz) = self.chunk_coord(x, z);
        RegionKey::new(cx, cz)
    }

    pub fn is_loaded(&self, x: i32, z: i32) -> bool {
        self.cache.read().contains_key(&self.chunk_coord(x, z))
    }

    pub fn loaded_chunk_count(&self) -> usize {
        self.cache.read().len()
    }

    /// Surface height of a loaded column; `None` if its chunk is unloaded.
    pub fn surface_height(&self, x: i32, z: i32) -> Option<i32> {
        let chunk = self.cache.read().get(&self.chunk_coord(x, z)).cloned()?;
        chunk.height_at(x, z)
    }

    // -----------------------------------------------------------------------
    // Cache helpers
    // -----------------------------------------------------------------------

    pub fn get_or_generate_chunk(&self, cx: i32, cz: i32) -> Arc<HeightChunk> {
        if let Some(chunk) = self.cache.read().get(&(cx, cz)) {
            return chunk.clone();
        }
        let mut cache = self.cache.write();
        match cache.entry((cx, cz)) {
            Entry::Occupied(e) => e.get().clone(),
            Entry::Vacant(v) => {
                let chunk = Arc::new(self.generate_chunk(cx, cz));
                v.insert(chunk.clone());
                chunk
            }
        }
    }

    /// Load every chunk within `radius` chunks (Chebyshev) of a column.
    pub fn load_around(&self, x: i32, z: i32, radius: i32) {
        let (ocx, ocz) = self.chunk_coord(x, z);
        for cx in ocx - radius..=ocx + radius {
            for cz in ocz - radius..=ocz + radius {
                self.get_or_generate_chunk(cx, cz);
            }
        }
    }

    pub fn unload_chunk(&self, cx: i32, cz: i32) -> bool {
        self.cache.write().remove(&(cx, cz)).is_some()
    }

    /// Evict every chunk further than `max_chunks` from `(origin_cx, origin_cz)`
    /// in Chebyshev distance.
    pub fn evict_distant_chunks(&self, origin_cx: i32, origin_cz: i32, max_chunks: i32) {
        let mut cache = self.cache.write();
        cache.retain(|(cx, cz), _| {
            (cx - origin_cx).abs() <= max_chunks && (cz - origin_cz).abs() <= max_chunks
        });
    }

    // -----------------------------------------------------------------------
    // Generation
    // -----------------------------------------------------------------------

    fn generate_chunk(&self, cx: i32, cz: i32) -> HeightChunk {
        let origin_x = cx * self.chunk_size;
        let origin_z = cz * self.chunk_size;
        let mut heights = Vec::with_capacity((self.chunk_size * self.chunk_size) as usize);
        for lz in 0..self.chunk_size {
            for lx in 0..self.chunk_size {
                heights.push(self.sample_height(origin_x + lx, origin_z + lz));
            }
        }
        HeightChunk {
            heights,
            size: self.chunk_size,
            origin_x,
            origin_z,
        }
    }

    /// Deterministic column height; does not touch the cache.
    pub fn sample_height(&self, x: i32, z: i32) -> i32 {
        let scale = 0.05;
        // Phase stays small so f32 keeps the column offset.
        let mixed = self.seed.wrapping_mul(6364136223846793005).wrapping_add(1);
        let s = (mixed % 10_000) as f32 * 1e-3;
        let wave = (x as f32 * scale + s).sin() * (z as f32 * scale + s).cos();
        self.base_height + (wave * 6.0).round() as i32
    }
}
