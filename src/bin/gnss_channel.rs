extern crate clap;
extern crate colored;
extern crate gnss_radio;
extern crate serde_json;

use std::error::Error;
use std::fs::File;
use std::io::BufReader;

use clap::{Arg, App};
use colored::*;
use log::info;
use gnss_radio::io::{IqFileSource, IqFormat, DEFAULT_BLOCK_LEN};
use gnss_radio::gnss::channel::{Channel, ChannelConfig, ChannelEvent, ChannelState};
use gnss_radio::gnss::signal::SignalId;
use gnss_radio::gnss::synchro::GnssSynchro;

fn main() -> Result<(), Box<dyn Error>> {

	pretty_env_logger::init();

	let matches = App::new("GNSS Channel")
		.version("0.1.0")
		.about("Takes IQ samples at baseband, acquires and tracks one GPS L1 C/A signal, and produces per-epoch synchronization records")
		.arg(Arg::with_name("filename")
			.short("f").long("filename")
			.help("Input filename")
			.required(true).takes_value(true))
		.arg(Arg::with_name("sample_rate_sps")
			.short("s").long("sample_rate_sps")
			.takes_value(true).required(true))
		.arg(Arg::with_name("prn")
			.short("p").long("prn")
			.takes_value(true).required(true))
		.arg(Arg::with_name("format")
			.long("format")
			.help("Sample format of the recording")
			.possible_values(&["i16", "f32"])
			.default_value("i16").takes_value(true))
		.arg(Arg::with_name("scale")
			.long("scale")
			.help("Multiplies every sample by this value")
			.takes_value(true))
		.arg(Arg::with_name("skip")
			.long("skip")
			.help("Samples to discard from the start of the recording")
			.takes_value(true))
		.arg(Arg::with_name("config")
			.short("c").long("config")
			.help("Channel configuration in JSON; any field left out takes its default")
			.takes_value(true))
		.arg(Arg::with_name("max_records")
			.short("m").long("max_records")
			.takes_value(true))
		.get_matches();

	// Parse mandatory fields
	let fname:&str = matches.value_of("filename").ok_or("missing filename")?;
	let fs:f64     = matches.value_of("sample_rate_sps").ok_or("missing sample rate")?.parse()?;
	let prn:usize  = matches.value_of("prn").ok_or("missing PRN")?.parse()?;

	// Parse optional fields
	let format = match matches.value_of("format") {
		Some("f32") => IqFormat::ComplexF32,
		_           => IqFormat::ComplexI16,
	};
	let scale:f64 = match matches.value_of("scale") { Some(s) => s.parse()?, None => 1.0 };
	let skip:u64  = match matches.value_of("skip")  { Some(s) => s.parse()?, None => 0 };
	let opt_max_records:Option<usize> = match matches.value_of("max_records") { Some(s) => Some(s.parse()?), None => None };
	let config:ChannelConfig = match matches.value_of("config") {
		Some(path) => serde_json::from_reader(BufReader::new(File::open(path)?))?,
		None       => ChannelConfig::default(),
	};

	let file = File::open(fname)?;
	let n_samples = file.metadata()?.len() / (format.bytes_per_sample() as u64);
	eprintln!("Processing {} ({} samples) at {} [samples/sec], PRN {}, max_records={:?}", &fname, &n_samples, &fs, &prn, &opt_max_records);

	let mut src = IqFileSource::new(BufReader::new(file), format, fs, DEFAULT_BLOCK_LEN)?.with_scale(scale);
	if skip > 0 { src.skip_samples(skip)?; }

	let mut channel = Channel::new(0, config, fs, SignalId::gps_l1_ca(prn))?;
	channel.start(None)?;

	let mut all_results:Vec<GnssSynchro> = vec![];

	'outer: for buf in src {
		let buf = buf?;
		for event in channel.apply(&buf.as_block())? {
			match event {
				ChannelEvent::Acquisition(r) => {
					let line = format!("{:9.2} [Hz], {:6} [samples], {:.3} vs {:.3}", r.doppler_hz, r.code_phase_samples, r.test_statistic, r.threshold);
					if r.detected { eprintln!("Acquired {}", line.green()) }
					else          { eprintln!("No detection {}", line.yellow()) }
				},
				ChannelEvent::StateChange{ to, sample_idx, .. } => {
					let line = format!("at sample {}", sample_idx);
					match to {
						ChannelState::Idle      => eprintln!("Idle {}", line),
						ChannelState::Acquiring => eprintln!("Acquiring {}", line.yellow()),
						ChannelState::Tracking  => eprintln!("Tracking {}", line.green()),
						ChannelState::Lost      => eprintln!("LostLock {}", line.red()),
					}
				},
				ChannelEvent::Synchro(rec) => {
					all_results.push(rec);
					if let Some(max_records) = opt_max_records {
						if all_results.len() >= max_records { break 'outer; }
					}
				},
			}
		}
		if channel.state() == ChannelState::Idle { break; }
	}

	info!("{} records", all_results.len());

	// Output data in JSON format
	println!("{}", serde_json::to_string_pretty(&all_results)?);

	Ok(())
}
