use anyhow::{Context, Result};
use winit::dpi::LogicalSize;

use prism_engine::coords::Extent;
use prism_engine::device::{PixelBuffer, PixelFormat};
use prism_engine::logging::{init_logging, LoggingConfig};
use prism_engine::window::{EffectScene, Runtime, ViewConfig};
use prism_engine::{effects, BlurEffect, CompositeEffect, Effect};

const CHECKER_SIZE: u32 = 512;
const CHECKER_CELL: u32 = 32;

/// Blur radius sweeps between 0 and this sigma.
const MAX_ANIMATED_SIGMA: f32 = 6.0;
const SWEEP_SECONDS: f64 = 4.0;

fn checkerboard() -> Result<PixelBuffer> {
    let mut bytes = Vec::with_capacity((CHECKER_SIZE * CHECKER_SIZE * 4) as usize);
    for y in 0..CHECKER_SIZE {
        for x in 0..CHECKER_SIZE {
            let light = ((x / CHECKER_CELL) + (y / CHECKER_CELL)) % 2 == 0;
            let texel = if light { [236, 120, 64, 255] } else { [32, 48, 96, 255] };
            bytes.extend_from_slice(&texel);
        }
    }
    PixelBuffer::new(Extent::new(CHECKER_SIZE, CHECKER_SIZE), PixelFormat::Rgba8Unorm, bytes)
        .context("failed to build checkerboard")
}

fn effect_chain() -> Result<CompositeEffect> {
    let blur = BlurEffect::new(0.0).context("failed to build blur")?;
    let mut chain = CompositeEffect::new(effects::grayscale(), blur).with_label("studio chain");
    chain.set_downsample_level(1);
    Ok(chain)
}

fn main() -> Result<()> {
    init_logging(LoggingConfig::default());

    let mut elapsed = 0.0f64;
    let scene = EffectScene::new(effect_chain()?)
        .with_source(checkerboard()?)
        .on_update(move |effect, dt| {
            elapsed += dt;
            let phase = (elapsed / SWEEP_SECONDS * std::f64::consts::TAU).sin() * 0.5 + 0.5;
            let sigma = phase as f32 * MAX_ANIMATED_SIGMA;

            let blur = effect.as_composite_mut().map(|chain| chain.second_mut());
            if let Some(Effect::Blur(blur)) = blur {
                if let Err(e) = blur.set_sigma(sigma) {
                    log::warn!("blur sigma {sigma}: {e}");
                }
            }
        });

    let config = ViewConfig {
        title: "prism studio".to_string(),
        initial_size: LogicalSize::new(960.0, 640.0),
        ..ViewConfig::default()
    };

    log::info!("starting prism studio");
    Runtime::run(config, scene)
}
