//! Fingerprint noise generation.
//!
//! Each challenge attempt gets its own small, bounded perturbation for the
//! canvas and audio read paths so that repeated visits from the same profile
//! do not hash to an identical device fingerprint. The WebGL identity stays
//! fixed for a profile's lifetime.

use rand::{Rng, seq::SliceRandom};

/// Upper bound for the per-channel canvas shift applied to pixel reads.
pub const MAX_CANVAS_SHIFT: u8 = 3;
/// Upper bound for the additive noise injected into audio samples.
pub const MAX_AUDIO_NOISE: f64 = 1e-7;

/// Per-attempt noise parameters consumed by the evasion scripts.
#[derive(Debug, Clone, PartialEq)]
pub struct FingerprintNoise {
    /// Added to RGB channels of `getImageData` results (alpha untouched).
    pub canvas_shift: [u8; 3],
    /// Seed used to pick which pixels receive the shift.
    pub canvas_seed: u32,
    pub webgl_vendor: String,
    pub webgl_renderer: String,
    /// Additive offset for `AnalyserNode`/`AudioBuffer` channel data.
    pub audio_noise: f64,
}

#[derive(Debug, Clone)]
struct GpuTemplate {
    vendor: &'static str,
    renderers: &'static [&'static str],
}

const GPU_TEMPLATES: &[GpuTemplate] = &[
    GpuTemplate {
        vendor: "Google Inc. (NVIDIA)",
        renderers: &[
            "ANGLE (NVIDIA, NVIDIA GeForce RTX 3060 Direct3D11 vs_5_0 ps_5_0, D3D11)",
            "ANGLE (NVIDIA, NVIDIA GeForce GTX 1660 SUPER Direct3D11 vs_5_0 ps_5_0, D3D11)",
        ],
    },
    GpuTemplate {
        vendor: "Google Inc. (AMD)",
        renderers: &["ANGLE (AMD, AMD Radeon RX 6800 XT Direct3D11 vs_5_0 ps_5_0, D3D11)"],
    },
    GpuTemplate {
        vendor: "Google Inc. (Intel)",
        renderers: &[
            "ANGLE (Intel, Intel(R) UHD Graphics 630 Direct3D11 vs_5_0 ps_5_0, D3D11)",
            "ANGLE (Intel, Intel(R) Iris(R) Xe Graphics Direct3D11 vs_5_0 ps_5_0, D3D11)",
        ],
    },
];

/// Produces fresh [`FingerprintNoise`] values.
#[derive(Debug, Default, Clone)]
pub struct FingerprintGenerator {
    pinned_gpu: Option<(String, String)>,
}

impl FingerprintGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pin one randomly chosen GPU for the lifetime of this generator.
    pub fn with_random_gpu() -> Self {
        let (vendor, renderer) = random_gpu(&mut rand::thread_rng());
        Self::new().with_gpu(vendor, renderer)
    }

    /// Keep the WebGL vendor/renderer fixed across attempts. A persistent
    /// profile that changes GPU on every visit is itself a signal.
    pub fn with_gpu(mut self, vendor: impl Into<String>, renderer: impl Into<String>) -> Self {
        self.pinned_gpu = Some((vendor.into(), renderer.into()));
        self
    }

    pub fn generate(&self) -> FingerprintNoise {
        let mut rng = rand::thread_rng();

        let (webgl_vendor, webgl_renderer) = match &self.pinned_gpu {
            Some((vendor, renderer)) => (vendor.clone(), renderer.clone()),
            None => random_gpu(&mut rng),
        };

        let mut canvas_shift = [0u8; 3];
        for channel in canvas_shift.iter_mut() {
            *channel = rng.gen_range(0..=MAX_CANVAS_SHIFT);
        }
        // An all-zero shift would leave the canvas hash untouched.
        if canvas_shift == [0, 0, 0] {
            canvas_shift[rng.gen_range(0..3)] = 1;
        }

        FingerprintNoise {
            canvas_shift,
            canvas_seed: rng.r#gen(),
            webgl_vendor,
            webgl_renderer,
            audio_noise: rng.gen_range(MAX_AUDIO_NOISE / 10.0..MAX_AUDIO_NOISE),
        }
    }
}

fn random_gpu<R: Rng + ?Sized>(rng: &mut R) -> (String, String) {
    let template = GPU_TEMPLATES
        .choose(rng)
        .unwrap_or(&GPU_TEMPLATES[0]);
    let renderer = template
        .renderers
        .choose(rng)
        .copied()
        .unwrap_or(template.renderers[0]);
    (template.vendor.to_string(), renderer.to_string())
}
