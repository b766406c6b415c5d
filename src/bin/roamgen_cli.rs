//! Minimal CLI chunk renderer.
//!
//! Renders one chunk (or the 2x2 composite around it) as ASCII on stdout,
//! with optional generation diagnostics. Useful for eyeballing seams and
//! style drift without standing up the HTTP server:
//!
//!   roamgen_cli --seed 7 --cx -3 --cy 5 --debug
//!   roamgen_cli --quad true          # (0,0)..(1,1) composite, seam check
//!
//! The composite view prints neighboring chunks side by side; a correct
//! build shows no wall/floor discontinuity across the seams.

#![forbid(unsafe_code)]

use std::env;

use roamgen::generator::generate_checked;
use roamgen::style::wavelength_report;
use roamgen::GenConfig;

fn parse_flag(args: &[String], key: &str) -> Option<String> {
    let mut it = args.iter();
    while let Some(a) = it.next() {
        if a == key {
            return it.next().cloned();
        }
    }
    None
}

fn parse_bool(s: &str) -> bool {
    matches!(s, "1" | "true" | "True" | "TRUE" | "yes" | "y")
}

fn main() -> anyhow::Result<()> {
    let args: Vec<String> = env::args().skip(1).collect();

    let mut config = GenConfig::default();
    if let Some(seed) = parse_flag(&args, "--seed") {
        config.world_seed = seed
            .parse()
            .map_err(|e| anyhow::anyhow!("--seed must be a u64: {e}"))?;
    }
    if let Some(size) = parse_flag(&args, "--size") {
        config.chunk_size = size
            .parse()
            .map_err(|e| anyhow::anyhow!("--size must be an integer: {e}"))?;
    }
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("invalid configuration: {e}"))?;

    let cx: i32 = parse_flag(&args, "--cx").map(|s| s.parse()).transpose()?.unwrap_or(0);
    let cy: i32 = parse_flag(&args, "--cy").map(|s| s.parse()).transpose()?.unwrap_or(0);
    let quad = parse_flag(&args, "--quad").map(|s| parse_bool(&s)).unwrap_or(false);
    let debug = parse_flag(&args, "--debug").map(|s| parse_bool(&s)).unwrap_or(false);

    if quad {
        // 2x2 composite: (cx,cy) (cx+1,cy) over (cx,cy+1) (cx+1,cy+1).
        let nw = generate_checked(&config, cx, cy)?;
        let ne = generate_checked(&config, cx + 1, cy)?;
        let sw = generate_checked(&config, cx, cy + 1)?;
        let se = generate_checked(&config, cx + 1, cy + 1)?;
        for (l, r) in nw.grid.rows().iter().zip(ne.grid.rows().iter()) {
            println!("{l}{r}");
        }
        for (l, r) in sw.grid.rows().iter().zip(se.grid.rows().iter()) {
            println!("{l}{r}");
        }
        return Ok(());
    }

    let chunk = generate_checked(&config, cx, cy)?;
    for row in chunk.grid.rows() {
        println!("{row}");
    }

    if debug {
        println!();
        println!("chunk ({cx},{cy})");
        println!(
            "style: alpha={:.3} beta={:.3} spatial_variation={:.3}",
            chunk.style.alpha, chunk.style.beta, chunk.style.spatial_variation
        );
        for line in wavelength_report(config.world_seed) {
            println!("  {line}");
        }
        println!("tablets: {:?}", chunk.tablets);
        let t = chunk.timings;
        println!(
            "timings (ms): setup={:.3} init={:.3} stubs={:.3} rooms={:.3} floors={:.3} halls={:.3} connect={:.3} total={:.3}",
            t.setup,
            t.init,
            t.boundary_corridors,
            t.room_generation,
            t.room_floors,
            t.room_hallways,
            t.boundary_connections,
            t.total
        );
    }
    Ok(())
}
