use std::io::{stdin, stdout, BufWriter, Read};
use std::str::FromStr;

use anyhow::anyhow;
use bytesize::ByteSize;
use clap::{value_parser, Arg, ArgAction, Command};
use tracing_subscriber::EnvFilter;

use bzstream::header::{StreamHeader, HEADER_LEN};
use bzstream::Config;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let matches = Command::new("bzip2")
        .arg(
            Arg::new("block-size")
                .short('b')
                .long("block-size")
                .value_parser(value_parser!(u8).range(1..=9))
                .default_value("9")
                .conflicts_with("decompress"),
        )
        .arg(
            Arg::new("buffer")
                .long("buffer")
                .default_value("32KiB"),
        )
        .arg(
            Arg::new("decompress")
                .short('d')
                .long("decompress")
                .required(false)
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("small")
                .short('s')
                .long("small")
                .required(false)
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("info")
                .long("info")
                .required(false)
                .action(ArgAction::SetTrue)
                .conflicts_with("decompress"),
        )
        .get_matches();

    let mut reader = stdin().lock();

    if matches.get_flag("info") {
        let mut header = Vec::new();
        reader.by_ref().take(HEADER_LEN as u64).read_to_end(&mut header)?;
        let header = StreamHeader::parse(&header)?;
        println!(
            "block size: {} ({}), first block: {:?}",
            header.block_size_factor,
            ByteSize(header.block_size() as u64).to_string_as(true),
            header.first_block
        );
        return Ok(());
    }

    let buffer = matches.get_one::<String>("buffer").unwrap();
    let buffer = ByteSize::from_str(buffer).map_err(|e| anyhow!("invalid buffer size: {e}"))?;
    let config = Config::default()
        .block_size_factor(*matches.get_one::<u8>("block-size").unwrap())
        .small_memory(matches.get_flag("small"))
        .buffer_capacity(buffer.0 as usize);

    let mut writer = BufWriter::new(stdout().lock());

    if matches.get_flag("decompress") {
        bzstream::stream::decompress(&mut reader, &mut writer, &config)?;
    } else {
        bzstream::stream::compress(&mut reader, &mut writer, &config)?;
    }
    Ok(())
}
