#![no_main]
use libfuzzer_sys::fuzz_target;
use rompatch::{PatchFormat, apply_patch, inspect_patch};

fuzz_target!(|data: &[u8]| {
    // Every decoder must return, never panic, on arbitrary bytes.
    // The first byte picks the checksum mode; the rest is split into a
    // source and a patch.
    let Some((&mode, rest)) = data.split_first() else {
        return;
    };
    let ignore_checksums = mode & 1 != 0;
    let split = usize::from(mode >> 1).min(rest.len());
    let (source, patch) = rest.split_at(split);

    for format in PatchFormat::ALL {
        let _ = apply_patch(source, patch, format, ignore_checksums);
        let _ = inspect_patch(patch, format);
    }
});
