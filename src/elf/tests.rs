use super::reloc::elf_r_info;
use super::*;
use crate::api::Redirect;
use std::ffi::c_void;

const PT_LOAD: ElfWord = 1;
const DT_DEBUG: ElfSxword = 21;

const GLOBAL_FUNC: u8 = 0x12;
const LOCAL_FUNC: u8 = 0x02;

const NSYMS: usize = 6;
const STR_FOPEN: u32 = 1;
const STR_RENAME: u32 = 7;
const STR_CXA_THROW: u32 = 14;
const STR_TARGET: u32 = 26;
const STR_LOCAL_ONLY: u32 = 33;
const STR_SONAME: u32 = 44;

// 内存中的合成模块映像，布局经 offset_of 取偏移后填入 dynamic 条目
#[repr(C)]
struct FakeImage<R: Copy> {
    dynamic: [ElfDyn; 9],
    hash: [u32; 9],
    symtab: [ElfSym; NSYMS],
    strtab: [u8; 57],
    relplt: [R; 2],
    slots: [usize; 2],
}

fn dyn_entry(d_tag: ElfSxword, d_un: ElfXword) -> ElfDyn {
    ElfDyn { d_tag, d_un }
}

fn sym(st_name: u32, st_info: u8) -> ElfSym {
    #[cfg(target_pointer_width = "64")]
    {
        ElfSym {
            st_name,
            st_info,
            st_other: 0,
            st_shndx: 1,
            st_value: 0x1000,
            st_size: 0,
        }
    }
    #[cfg(target_pointer_width = "32")]
    {
        ElfSym {
            st_name,
            st_value: 0x1000,
            st_size: 0,
            st_info,
            st_other: 0,
            st_shndx: 1,
        }
    }
}

fn rela(r_offset: usize, sym_idx: u32, r_type: u32, r_addend: i64) -> ElfRela {
    ElfRela {
        r_offset: r_offset as ElfAddr,
        r_info: elf_r_info(sym_idx, r_type),
        r_addend: r_addend as ElfSxword,
    }
}

fn rel(r_offset: usize, sym_idx: u32, r_type: u32) -> ElfRel {
    ElfRel {
        r_offset: r_offset as ElfAddr,
        r_info: elf_r_info(sym_idx, r_type),
    }
}

fn phdr_dynamic(p_vaddr: usize, p_memsz: usize) -> ElfPhdr {
    #[cfg(target_pointer_width = "64")]
    {
        ElfPhdr {
            p_type: PT_DYNAMIC,
            p_flags: 0,
            p_offset: 0,
            p_vaddr: p_vaddr as ElfAddr,
            p_paddr: 0,
            p_filesz: p_memsz as ElfXword,
            p_memsz: p_memsz as ElfXword,
            p_align: 8,
        }
    }
    #[cfg(target_pointer_width = "32")]
    {
        ElfPhdr {
            p_type: PT_DYNAMIC,
            p_offset: 0,
            p_vaddr: p_vaddr as ElfAddr,
            p_paddr: 0,
            p_filesz: p_memsz as ElfWord,
            p_memsz: p_memsz as ElfWord,
            p_flags: 0,
            p_align: 4,
        }
    }
}

fn phdr_load() -> ElfPhdr {
    let mut phdr = phdr_dynamic(0, 0x1000);
    phdr.p_type = PT_LOAD;
    phdr
}

fn make_strtab() -> [u8; 57] {
    let mut strtab = [0u8; 57];
    strtab.copy_from_slice(b"\0fopen\0rename\0__cxa_throw\0target\0local_only\0libtarget.so\0");
    strtab
}

fn make_symtab() -> [ElfSym; NSYMS] {
    [
        sym(0, 0),
        sym(STR_FOPEN, GLOBAL_FUNC),
        sym(STR_RENAME, GLOBAL_FUNC),
        sym(STR_CXA_THROW, GLOBAL_FUNC),
        sym(STR_TARGET, GLOBAL_FUNC),
        sym(STR_LOCAL_ONLY, LOCAL_FUNC),
    ]
}

// nbucket=1：所有符号同链，便于验证链式遍历与禁用后的再查找
fn make_hash() -> [u32; 9] {
    [1, NSYMS as u32, 1, 0, 2, 3, 4, 5, 0]
}

fn build_image<R: Copy>(relplt: [R; 2], pltrel_val: ElfSxword, with_hash: bool) -> Box<FakeImage<R>> {
    let mut entries = vec![
        dyn_entry(DT_STRTAB, mem::offset_of!(FakeImage<R>, strtab) as ElfXword),
        dyn_entry(DT_SYMTAB, mem::offset_of!(FakeImage<R>, symtab) as ElfXword),
        dyn_entry(DT_JMPREL, mem::offset_of!(FakeImage<R>, relplt) as ElfXword),
        dyn_entry(DT_PLTRELSZ, mem::size_of::<[R; 2]>() as ElfXword),
        dyn_entry(DT_PLTREL, pltrel_val as ElfXword),
        dyn_entry(DT_SONAME, STR_SONAME as ElfXword),
        // 未识别的 tag 应被忽略
        dyn_entry(DT_DEBUG, 0),
    ];
    if with_hash {
        entries.insert(0, dyn_entry(DT_HASH, mem::offset_of!(FakeImage<R>, hash) as ElfXword));
    }
    entries.push(dyn_entry(DT_NULL, 0));

    let mut dynamic = [dyn_entry(DT_NULL, 0); 9];
    dynamic[..entries.len()].copy_from_slice(&entries);

    Box::new(FakeImage {
        dynamic,
        hash: make_hash(),
        symtab: make_symtab(),
        strtab: make_strtab(),
        relplt,
        slots: [0xAAAA, 0xBBBB],
    })
}

fn parse_image<R: Copy>(image: &mut FakeImage<R>) -> Result<DynamicState, Errno> {
    let base = std::ptr::addr_of_mut!(*image) as usize;
    let phdrs = [phdr_dynamic(
        mem::offset_of!(FakeImage<R>, dynamic),
        mem::size_of::<[ElfDyn; 9]>(),
    )];
    unsafe { DynamicState::parse(base, &phdrs, "libtarget.so") }
}

fn default_relplt() -> [ElfRela; 2] {
    let slot0 = mem::offset_of!(FakeImage<ElfRela>, slots);
    let slot1 = slot0 + mem::size_of::<usize>();
    [
        rela(slot0, 1, R_GENERIC_JUMP_SLOT, 0x10),
        rela(slot1, 2, R_GENERIC_JUMP_SLOT, 0),
    ]
}

#[test]
fn elf_hash_golden_fopen() {
    assert_eq!(elf_hash(b"fopen"), 0x006d_66be);
}

#[test]
fn elf_hash_deterministic() {
    assert_eq!(elf_hash(b"__cxa_throw"), elf_hash(b"__cxa_throw"));
    assert_ne!(elf_hash(b"fopen"), elf_hash(b"rename"));
}

#[test]
fn parse_extracts_all_tables() {
    let mut image = build_image(default_relplt(), DT_RELA, true);
    let state = parse_image(&mut *image).expect("parse should succeed");

    assert!(state.is_use_rela());
    assert_eq!(state.bucket_cnt, 1);
    assert_eq!(state.chain_cnt, NSYMS as u32);
    assert_eq!(state.relplt_sz, mem::size_of::<[ElfRela; 2]>());
    assert!(unsafe { state.soname_matches("libtarget.so") });
    assert!(!unsafe { state.soname_matches("libother.so") });
}

#[test]
fn parse_rel_encoding() {
    let slot0 = mem::offset_of!(FakeImage<ElfRel>, slots);
    let mut image = build_image([rel(slot0, 1, R_GENERIC_JUMP_SLOT); 2], DT_REL, true);
    let state = parse_image(&mut *image).expect("parse should succeed");
    assert!(!state.is_use_rela());
}

#[test]
fn parse_without_dynamic_segment_fails() {
    let image = build_image(default_relplt(), DT_RELA, true);
    let base = std::ptr::addr_of!(*image) as usize;
    let phdrs = [phdr_load()];
    let err = unsafe { DynamicState::parse(base, &phdrs, "libtarget.so") }
        .expect_err("parse should fail");
    assert_eq!(err, Errno::NoDynamic);
}

#[test]
fn parse_missing_hash_table_fails_without_writes() {
    let mut image = build_image(default_relplt(), DT_RELA, false);
    let err = parse_image(&mut *image).expect_err("parse should fail");
    assert_eq!(err, Errno::BadDynamic);

    // 硬性解析失败后映像不得有任何改动
    assert_eq!(image.strtab, make_strtab());
    assert_eq!(image.slots, [0xAAAA, 0xBBBB]);
}

#[test]
fn lookup_walks_hash_chain() {
    let mut image = build_image(default_relplt(), DT_RELA, true);
    let state = parse_image(&mut *image).expect("parse should succeed");

    assert_eq!(state.find_symidx_by_name("target"), Ok(4));
    assert_eq!(state.find_symidx_by_name("fopen"), Ok(1));
    assert_eq!(state.find_symidx_by_name("absent"), Err(Errno::NoSym));
}

#[test]
fn lookup_aborts_on_chain_cycle() {
    let mut image = build_image(default_relplt(), DT_RELA, true);
    // hash 布局 [nbucket, nchain, bucket[0], chain[0..6]]：chain[1] 指回自身成环
    image.hash[4] = 1;
    let state = parse_image(&mut *image).expect("parse should succeed");

    assert_eq!(state.find_symidx_by_name("rename"), Err(Errno::Format));
}

#[test]
fn lookup_aborts_on_out_of_range_bucket() {
    let mut image = build_image(default_relplt(), DT_RELA, true);
    // bucket[0] 越过 nchain
    image.hash[2] = 99;
    let state = parse_image(&mut *image).expect("parse should succeed");

    assert_eq!(state.find_symidx_by_name("fopen"), Err(Errno::Format));
}

#[test]
fn disable_rejects_local_binding() {
    let mut image = build_image(default_relplt(), DT_RELA, true);
    let state = parse_image(&mut *image).expect("parse should succeed");

    // 首个同名条目 binding 不合格即视为未找到
    let err = unsafe { state.disable_symbol("local_only") }.expect_err("disable should fail");
    assert_eq!(err, Errno::NoSym);
    assert_eq!(&image.strtab[STR_LOCAL_ONLY as usize..44], b"local_only\0");
}

#[test]
fn disable_rewrites_name_prefix_only() {
    let mut image = build_image(default_relplt(), DT_RELA, true);
    let state = parse_image(&mut *image).expect("parse should succeed");

    unsafe { state.disable_symbol("__cxa_throw") }.expect("disable should succeed");

    let start = STR_CXA_THROW as usize;
    assert_eq!(&image.strtab[start..start + 3], b":3\0");
    assert_eq!(&image.strtab[start + 3..start + 12], b"xa_throw\0");
    // 相邻符号名不受影响
    assert_eq!(&image.strtab[STR_RENAME as usize..start], b"rename\0");

    // 原名从此查不到，3 字节哨兵名沿同一条链可查到
    assert_eq!(state.find_symidx_by_name("__cxa_throw"), Err(Errno::NoSym));
    assert_eq!(state.find_symidx_by_name(":3"), Ok(3));
}

#[test]
fn patch_rela_applies_addend() {
    let mut image = build_image(default_relplt(), DT_RELA, true);
    let state = parse_image(&mut *image).expect("parse should succeed");

    let redirects = [Redirect {
        sym_name: "fopen",
        new_func: 0x1234_5678 as *mut c_void,
    }];
    let outcomes = unsafe { state.patch_plt_relocs(&redirects) };

    assert_eq!(outcomes.len(), 1);
    assert!(outcomes[0].is_ok());
    // reloc = S + A
    assert_eq!(image.slots[0], 0x1234_5678 + 0x10);
    // 未请求的符号对应 slot 原样保留
    assert_eq!(image.slots[1], 0xBBBB);
}

#[test]
fn patch_rel_has_no_addend() {
    let slot0 = mem::offset_of!(FakeImage<ElfRel>, slots);
    let slot1 = slot0 + mem::size_of::<usize>();
    let mut image = build_image(
        [
            rel(slot0, 1, R_GENERIC_JUMP_SLOT),
            rel(slot1, 2, R_GENERIC_JUMP_SLOT),
        ],
        DT_REL,
        true,
    );
    let state = parse_image(&mut *image).expect("parse should succeed");

    let redirects = [Redirect {
        sym_name: "rename",
        new_func: 0x4040_0000 as *mut c_void,
    }];
    let outcomes = unsafe { state.patch_plt_relocs(&redirects) };

    assert!(outcomes[0].is_ok());
    assert_eq!(image.slots[0], 0xAAAA);
    assert_eq!(image.slots[1], 0x4040_0000);
}

#[test]
fn patch_both_requested_targets() {
    let mut image = build_image(default_relplt(), DT_RELA, true);
    let state = parse_image(&mut *image).expect("parse should succeed");

    let redirects = [
        Redirect {
            sym_name: "fopen",
            new_func: 0x1000_0000 as *mut c_void,
        },
        Redirect {
            sym_name: "rename",
            new_func: 0x2000_0000 as *mut c_void,
        },
    ];
    let outcomes = unsafe { state.patch_plt_relocs(&redirects) };

    assert!(outcomes.iter().all(TargetOutcome::is_ok));
    assert_eq!(image.slots[0], 0x1000_0000 + 0x10);
    assert_eq!(image.slots[1], 0x2000_0000);
}

#[test]
fn patch_rejects_non_jump_slot_type() {
    let slot0 = mem::offset_of!(FakeImage<ElfRela>, slots);
    let slot1 = slot0 + mem::size_of::<usize>();
    let mut image = build_image(
        [
            rela(slot0, 1, 0x99, 0),
            rela(slot1, 2, R_GENERIC_JUMP_SLOT, 0),
        ],
        DT_RELA,
        true,
    );
    let state = parse_image(&mut *image).expect("parse should succeed");

    let redirects = [Redirect {
        sym_name: "fopen",
        new_func: 0x1234_5678 as *mut c_void,
    }];
    let outcomes = unsafe { state.patch_plt_relocs(&redirects) };

    assert_eq!(outcomes[0].errno, Errno::BadRelocType);
    assert_eq!(image.slots, [0xAAAA, 0xBBBB]);
}

#[test]
fn patch_skips_unbound_symbol_index() {
    let slot0 = mem::offset_of!(FakeImage<ElfRela>, slots);
    let mut image = build_image(
        [rela(slot0, 0, R_GENERIC_JUMP_SLOT, 0); 2],
        DT_RELA,
        true,
    );
    let state = parse_image(&mut *image).expect("parse should succeed");

    let redirects = [Redirect {
        sym_name: "fopen",
        new_func: 0x1234_5678 as *mut c_void,
    }];
    let outcomes = unsafe { state.patch_plt_relocs(&redirects) };

    // 符号索引 0 的条目不参与匹配，也不算失败
    assert!(outcomes[0].is_ok());
    assert_eq!(image.slots, [0xAAAA, 0xBBBB]);
}
