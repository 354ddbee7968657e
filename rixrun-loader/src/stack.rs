//! Builds the initial guest stack: the argument/environment string table and
//! the `argc`/`argv`/`envp` pointer tables below it, matching the layout
//! RISCiX's `loader_build_argptr` hands to a freshly `exec`'d process.

use rixrun_mem::GuestMemory;

use crate::LoaderError;

/// Copies `strings` into guest memory below `sp`, NUL-terminated, packed so
/// that the *first* entry of `strings` ends up at the lowest address.
///
/// Writes proceed from the end of `strings` backwards, each one decrementing
/// the write cursor by its length (plus the NUL) before writing — so the
/// cursor never re-reads memory it already committed, and the final layout
/// reads in the same order as `strings` from low to high addresses.
///
/// Returns the address of the first byte written (the start of the string
/// table), which becomes both the new stack-area high-water mark and the
/// address [`build_argptr`] walks forward from.
///
/// # Errors
///
/// Returns [`LoaderError::StackOverflow`] if the strings don't fit below
/// `sp`, or [`LoaderError::Memory`] if writing falls outside the guest
/// address space.
pub fn copy_strings(mem: &mut GuestMemory, sp: u32, strings: &[&str]) -> Result<u32, LoaderError> {
    let mut p = sp;
    for s in strings.iter().rev() {
        let bytes = s.as_bytes();
        let len = u32::try_from(bytes.len()).map_err(|_| LoaderError::StackOverflow)? + 1;
        p = p.checked_sub(len).ok_or(LoaderError::StackOverflow)?;
        mem.write_bytes_raw(p, bytes)?;
        mem.write_byte_raw(p + bytes.len() as u32, 0)?;
    }
    Ok(p)
}

/// Builds the `argc`/`argv[]`/`envp[]` pointer tables immediately below
/// `sp`, pointing into the string table that starts at `stringp`
/// (typically the value [`copy_strings`] just returned).
///
/// Layout, from the returned stack pointer upward: `argc` word, `argc`
/// pointers plus a NUL terminator (`argv`), then `envc` pointers plus a NUL
/// terminator (`envp`) — reproducing the System V crt0 calling convention a
/// guest's `_start` expects to find at the initial `R13`.
///
/// `stringp` is walked forward with [`rixrun_mem::GuestMemory::read_cstr`]
/// to recover each string's address and length without needing them passed
/// in twice; the first `argc` strings found there are assumed to be argv,
/// the next `envc` to be envp — i.e. `stringp` must be the return value of a
/// `copy_strings` call whose `strings` slice was `argv` followed by `envp`.
///
/// # Errors
///
/// Returns [`LoaderError::StackOverflow`] if the tables don't fit below
/// `sp`, or [`LoaderError::Memory`] on any out-of-bounds access.
pub fn build_argptr(
    mem: &mut GuestMemory,
    envc: u32,
    argc: u32,
    sp: u32,
    stringp: u32,
) -> Result<u32, LoaderError> {
    let mut p = sp;

    p = p.checked_sub(4).ok_or(LoaderError::StackOverflow)?;
    mem.write_word_raw(p, 0)?; // envp terminator
    let envp_table = p.checked_sub(envc * 4).ok_or(LoaderError::StackOverflow)?;
    p = envp_table;

    p = p.checked_sub(4).ok_or(LoaderError::StackOverflow)?;
    mem.write_word_raw(p, 0)?; // argv terminator
    let argv_table = p.checked_sub(argc * 4).ok_or(LoaderError::StackOverflow)?;
    p = argv_table;

    p = p.checked_sub(4).ok_or(LoaderError::StackOverflow)?;
    mem.write_word_raw(p, argc)?;
    let final_sp = p;

    let mut cursor = stringp;
    for i in 0..argc {
        mem.write_word_raw(argv_table + i * 4, cursor)?;
        let s = mem.read_cstr(cursor)?;
        cursor += s.to_bytes_with_nul().len() as u32;
    }
    for i in 0..envc {
        mem.write_word_raw(envp_table + i * 4, cursor)?;
        let s = mem.read_cstr(cursor)?;
        cursor += s.to_bytes_with_nul().len() as u32;
    }

    Ok(final_sp)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn copy_strings_lays_out_ascending_in_list_order() {
        let mut mem = GuestMemory::new(None);
        let sp = 0x0010_0000;
        let stringp = copy_strings(&mut mem, sp, &["foo", "bar", "A=1"]).unwrap();

        assert_eq!(mem.read_cstr(stringp).unwrap().to_bytes(), b"foo");
        let after_foo = stringp + 4; // "foo\0"
        assert_eq!(mem.read_cstr(after_foo).unwrap().to_bytes(), b"bar");
        let after_bar = after_foo + 4; // "bar\0"
        assert_eq!(mem.read_cstr(after_bar).unwrap().to_bytes(), b"A=1");
    }

    #[test]
    fn build_argptr_fills_argv_then_envp_and_terminates_both() {
        let mut mem = GuestMemory::new(None);
        let sp = 0x0010_0000;
        let stringp = copy_strings(&mut mem, sp, &["foo", "bar", "A=1"]).unwrap();
        let final_sp = build_argptr(&mut mem, 1, 2, stringp, stringp).unwrap();

        let argc = mem.read_word_raw(final_sp).unwrap();
        assert_eq!(argc, 2);
        let argv0 = mem.read_word_raw(final_sp + 4).unwrap();
        let argv1 = mem.read_word_raw(final_sp + 8).unwrap();
        let argv_term = mem.read_word_raw(final_sp + 12).unwrap();
        assert_eq!(mem.read_cstr(argv0).unwrap().to_bytes(), b"foo");
        assert_eq!(mem.read_cstr(argv1).unwrap().to_bytes(), b"bar");
        assert_eq!(argv_term, 0);

        let envp0 = mem.read_word_raw(final_sp + 16).unwrap();
        let envp_term = mem.read_word_raw(final_sp + 20).unwrap();
        assert_eq!(mem.read_cstr(envp0).unwrap().to_bytes(), b"A=1");
        assert_eq!(envp_term, 0);
    }

    #[test]
    fn build_argptr_aligns_the_stack_pointer_even_when_the_string_base_is_not() {
        let mut mem = GuestMemory::new(None);
        let sp = 0x0010_0000;
        // "foo\0bar\0ab\0" is 11 bytes, so stringp lands on a non-4-aligned
        // address; callers are expected to align it down before it's used
        // as the table-building `sp`, while still using the unaligned value
        // as the string base passed separately.
        let stringp = copy_strings(&mut mem, sp, &["foo", "bar", "ab"]).unwrap();
        assert_ne!(stringp % 4, 0, "test fixture must exercise an unaligned string base");

        let final_sp = build_argptr(&mut mem, 0, 2, stringp & !3, stringp).unwrap();
        assert_eq!(final_sp % 4, 0, "R13 must land on a 4-byte-aligned word");

        let argc = mem.read_word_raw(final_sp).unwrap();
        assert_eq!(argc, 2);
        let argv0 = mem.read_word_raw(final_sp + 4).unwrap();
        let argv1 = mem.read_word_raw(final_sp + 8).unwrap();
        assert_eq!(mem.read_cstr(argv0).unwrap().to_bytes(), b"foo");
        assert_eq!(mem.read_cstr(argv1).unwrap().to_bytes(), b"bar");
    }

    #[test]
    fn rejects_tables_that_underflow_guest_address_zero() {
        let mut mem = GuestMemory::new(None);
        let err = build_argptr(&mut mem, 0, 0, 4, 4);
        assert!(err.is_ok());
        let err = copy_strings(&mut mem, 2, &["too long for two bytes"]);
        assert!(matches!(err, Err(LoaderError::StackOverflow)));
    }
}
