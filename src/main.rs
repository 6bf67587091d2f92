// Copyright 2020 TwoCookingMice

use sdtree::core::bsdf::BSDF;
use sdtree::core::rng::LcgRng;
use sdtree::core::sampler::Sampler;
use sdtree::guiding::config::GuidingConfig;
use sdtree::guiding::session::GuidingSession;
use sdtree::guiding::wrapper::DTreeRecord;
use sdtree::materials::lambertian_diffuse::LambertianDiffuseBSDF;
use sdtree::math::aabb::AABB;
use sdtree::math::constants::{ Float, Vector3f };

use indicatif::{ ProgressBar, ProgressStyle };

use std::env;
use std::sync::atomic::{ AtomicUsize, Ordering };
use std::sync::{ mpsc, Arc };
use std::thread;

/// Radiance arriving at a point: a dim sky plus a small bright source
/// whose direction depends on where the point is.
struct SyntheticField {
    light_position: Vector3f,
    cos_light_radius: Float,
    light_radiance: Float,
    ambient: Float,
}

impl SyntheticField {
    fn radiance(&self, p: &Vector3f, d: &Vector3f) -> Float {
        let to_light = (self.light_position - p).normalize();
        if d.dot(&to_light) > self.cos_light_radius {
            self.light_radiance
        } else {
            self.ambient
        }
    }
}

#[derive(Default, Clone, Copy)]
struct PassEstimate {
    sum: f64,
    sum_sq: f64,
    count: usize,
}

impl PassEstimate {
    fn merge(&mut self, other: &PassEstimate) {
        self.sum += other.sum;
        self.sum_sq += other.sum_sq;
        self.count += other.count;
    }

    fn mean(&self) -> f64 {
        if self.count == 0 { 0.0 } else { self.sum / self.count as f64 }
    }

    fn variance(&self) -> f64 {
        if self.count < 2 {
            return 0.0;
        }
        let mean = self.mean();
        (self.sum_sq / self.count as f64 - mean * mean).max(0.0)
    }
}

fn run_pass(session: &GuidingSession,
            field: &SyntheticField,
            bsdf: &dyn BSDF,
            bounds: &AABB,
            num_points: usize,
            spp: usize,
            seed: u64,
            pass: usize) -> PassEstimate {
    let block_size = 256usize;
    let total_blocks = (num_points + block_size - 1) / block_size;

    let progress = ProgressBar::new(total_blocks as u64);
    progress.set_style(
        ProgressStyle::with_template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} blocks")
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );

    let next_block = Arc::new(AtomicUsize::new(0));
    let thread_count = thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    let (tx, rx) = mpsc::channel::<PassEstimate>();
    let mut estimate = PassEstimate::default();
    let extent = bounds.diagonal();

    thread::scope(|scope| {
        for _ in 0..thread_count {
            let next_block = Arc::clone(&next_block);
            let tx = tx.clone();
            scope.spawn(move || {
                loop {
                    let block_index = next_block.fetch_add(1, Ordering::Relaxed);
                    if block_index >= total_blocks {
                        break;
                    }

                    let mut rng = LcgRng::new(((seed & 0xFFF) << 32)
                                              | (((pass as u64) & 0xFF) << 24)
                                              | ((block_index as u64) & 0xFFFFFF));
                    let mut block = PassEstimate::default();
                    let first = block_index * block_size;
                    let last = (first + block_size).min(num_points);
                    for _ in first..last {
                        let p = bounds.p_min + Vector3f::new(rng.get_1d() * extent.x,
                                                             rng.get_1d() * extent.y,
                                                             rng.get_1d() * extent.z);
                        let (wrapper, voxel_size) = session.dtree_wrapper(&p);
                        let wi = Vector3f::new(0.0, 0.0, 1.0);

                        let mut value = 0.0;
                        for _ in 0..spp {
                            let s = match session.sample_mixture(wrapper, bsdf, &wi, &mut rng) {
                                Some(s) => s,
                                None => continue,
                            };
                            let radiance = field.radiance(&p, &s.wo);
                            value += s.weight * radiance;

                            let rec = DTreeRecord {
                                d: s.wo,
                                radiance,
                                product: s.weight * s.wo_pdf * radiance,
                                wo_pdf: s.wo_pdf,
                                bsdf_pdf: s.bsdf_pdf,
                                dtree_pdf: s.dtree_pdf,
                                statistical_weight: 1.0,
                                is_delta: s.is_delta,
                            };
                            session.record(&p, &voxel_size, &rec, &mut rng);
                        }

                        let value = (value / spp as Float) as f64;
                        block.sum += value;
                        block.sum_sq += value * value;
                        block.count += 1;
                    }
                    if tx.send(block).is_err() {
                        break;
                    }
                }
            });
        }

        drop(tx);
        for _ in 0..total_blocks {
            if let Ok(block) = rx.recv() {
                estimate.merge(&block);
                progress.inc(1);
            }
        }
    });
    progress.finish_and_clear();
    estimate
}

fn main() {
    env::set_var("RUST_LOG", "info");
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    let mut config_path: Option<String> = None;
    let mut passes: usize = 6;
    let mut num_points: usize = 16384;
    let mut spp_override: Option<u32> = None;
    let mut seed: u64 = 0;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--config" => {
                i += 1;
                config_path = args.get(i).cloned();
            }
            "--passes" => {
                i += 1;
                passes = args.get(i).and_then(|v| v.parse::<usize>().ok()).unwrap_or(passes);
            }
            "--points" => {
                i += 1;
                num_points = args.get(i).and_then(|v| v.parse::<usize>().ok()).unwrap_or(num_points);
            }
            "--spp" => {
                i += 1;
                spp_override = args.get(i).and_then(|v| v.parse::<u32>().ok());
            }
            "--seed" => {
                i += 1;
                seed = args.get(i).and_then(|v| v.parse::<u64>().ok()).unwrap_or(0);
            }
            "--help" | "-h" => {
                eprintln!("Usage: {} [--config integrator.xml] [--passes N] [--points N] [--spp N] [--seed N]", args[0]);
                return;
            }
            _ => {}
        }
        i += 1;
    }

    let mut config = match config_path {
        Some(path) => {
            let xml = match std::fs::read_to_string(&path) {
                Ok(xml) => xml,
                Err(e) => {
                    log::error!("Failed to read {}: {}", path, e);
                    std::process::exit(1);
                }
            };
            match GuidingConfig::from_xml_str(&xml) {
                Ok(config) => config,
                Err(e) => {
                    log::error!("Failed to parse {}: {}", path, e);
                    std::process::exit(1);
                }
            }
        }
        None => GuidingConfig::default(),
    };
    if let Some(spp) = spp_override {
        config.spp_per_pass = spp;
    }

    let bounds = AABB::new(Vector3f::new(-1.0, -1.0, -1.0), Vector3f::new(1.0, 1.0, 1.0));
    let field = SyntheticField {
        light_position: Vector3f::new(0.0, 0.0, 4.0),
        cos_light_radius: (0.05 as Float).cos(),
        light_radiance: 200.0,
        ambient: 0.1,
    };
    let bsdf = LambertianDiffuseBSDF::new(0.8, Vector3f::new(0.0, 0.0, 1.0));

    let spp_per_pass = config.spp_per_pass as usize;
    let mut session = match GuidingSession::new(config, &bounds) {
        Ok(session) => session,
        Err(e) => {
            log::error!("{}", e);
            std::process::exit(1);
        }
    };

    for pass in 0..passes {
        if let Err(e) = session.reset_distributions() {
            log::warn!("Pass {}: {}", pass, e);
        }

        let spp = spp_per_pass << pass.min(16);
        let estimate = run_pass(&session, &field, &bsdf, &bounds, num_points, spp, seed, pass);
        log::info!("Pass {} ({} spp): mean = {:.5}, variance = {:.5}",
                   pass, spp, estimate.mean(), estimate.variance());

        session.build_distributions();
    }
}
