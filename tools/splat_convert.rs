use std::{
    path::Path,
    sync::Arc,
};

use byte_unit::{Byte, UnitType};
use clap::Parser;
use tracing::{
    debug,
    info,
};

use splat_codecs::{
    DecodeOutput,
    DecodeTask,
    Decoder,
    io::{
        fetch::{
            Fetch,
            FsFetcher,
        },
        loader::{
            decode_pool,
            detect,
        },
        writer,
    },
    utils::{
        ConvertTarget,
        SplatConvertArgs,
        setup_logging,
    },
};


fn human_size(bytes: usize) -> String {
    Byte::from_u64(bytes as u64)
        .get_appropriate_unit(UnitType::Decimal)
        .to_string()
}

fn build_decoder(args: &SplatConvertArgs, input: &Path) -> Decoder {
    #[cfg(feature = "io_sog")]
    {
        use splat_codecs::io::sog::SogCodec;

        let sog = SogCodec::default()
            .with_include_sh(args.include_sh)
            .with_fetcher(Arc::new(FsFetcher::sibling_of(input)));
        Decoder::new().with_sog(sog)
    }

    #[cfg(not(feature = "io_sog"))]
    {
        let _ = (args, input);
        Decoder::new()
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    setup_logging();

    let args = SplatConvertArgs::parse();
    if args.input_file.is_empty() {
        return Err("no --input-file given".into());
    }

    let input = Path::new(&args.input_file);
    let mut report = |fraction: f32| debug!("read {:.0}%", fraction * 100.0);
    let bytes = FsFetcher::default().fetch(&args.input_file, Some(&mut report))?;

    let extension = input.extension().and_then(|extension| extension.to_str());
    let format = match args.format {
        Some(format) => format,
        None => detect(&bytes, extension)?,
    };
    info!("decoding `{}` as {format:?} ({})", args.input_file, human_size(bytes.len()));

    let decoder = build_decoder(&args, input);

    let output = if args.use_pool {
        let pool = decode_pool(args.pool_config(), Arc::new(decoder))?;

        let handles = (0..args.repeat.max(1))
            .map(|_| pool.submit(DecodeTask::new(format, args.output, bytes.clone())))
            .collect::<Result<Vec<_>, _>>()?;

        let mut outputs = handles
            .into_iter()
            .map(|handle| handle.wait())
            .collect::<Result<Vec<_>, _>>()?;

        pool.shutdown();
        outputs.swap_remove(0)
    } else {
        decoder.decode_as(format, &bytes, args.output)?
    };

    match &output {
        DecodeOutput::Columns(columns) => info!(
            "decoded {} splats, {} sh coefficients",
            columns.len(),
            columns.sh_rest_count(),
        ),
        DecodeOutput::SplatBuffer(buffer) => info!("decoded {} splats", buffer.len()),
    }

    if args.output_file.is_empty() {
        return Ok(());
    }

    let file = std::fs::File::create(&args.output_file)?;
    let mut out = std::io::BufWriter::new(file);
    let written = match args.target {
        ConvertTarget::Splat => writer::write_splat(&output.into_splat_buffer(), &mut out)?,
        ConvertTarget::Ply => writer::write_ply(&output.into_columns(), &mut out)?,
    };

    info!("wrote `{}` ({})", args.output_file, human_size(written));

    Ok(())
}
