// ELF 解析与 PLT/符号补丁核心模块

use crate::api::{Redirect, TargetOutcome};
use crate::errno::Errno;
use crate::log;
use crate::memory::ProtGuard;
use std::ffi::{CStr, c_char};
use std::mem;
use std::ptr;
use std::slice;

// ELF SysV 符号哈希算法
mod hash;
// 重定位条目的 r_sym / r_type 提取
mod reloc;

pub(crate) use hash::elf_hash;
pub(crate) use reloc::elf_r_info;
use reloc::{elf_r_sym, elf_r_type};

pub(crate) const PT_DYNAMIC: ElfWord = 2;

// dynamic section 标签常量
pub(crate) const DT_NULL: ElfSxword = 0;
pub(crate) const DT_PLTRELSZ: ElfSxword = 2;
pub(crate) const DT_HASH: ElfSxword = 4;
pub(crate) const DT_STRTAB: ElfSxword = 5;
pub(crate) const DT_SYMTAB: ElfSxword = 6;
pub(crate) const DT_RELA: ElfSxword = 7;
pub(crate) const DT_SONAME: ElfSxword = 14;
pub(crate) const DT_REL: ElfSxword = 17;
pub(crate) const DT_PLTREL: ElfSxword = 20;
pub(crate) const DT_JMPREL: ElfSxword = 23;

// 符号 st_info 的 binding / type 编码
const STB_GLOBAL: u8 = 1;
const STT_FUNC: u8 = 2;

fn elf_st_bind(info: u8) -> u8 {
    info >> 4
}

fn elf_st_type(info: u8) -> u8 {
    info & 0xf
}

// 各架构的 jump-slot 重定位类型
const R_ARM_JUMP_SLOT: u32 = 22;
const R_AARCH64_JUMP_SLOT: u32 = 1026;
// x86_64 仅用于宿主机开发与测试
const R_X86_64_JUMP_SLOT: u32 = 7;

// 按目标架构一次性选定本进程使用的 jump-slot 类型
#[cfg(target_arch = "arm")]
pub(crate) const R_GENERIC_JUMP_SLOT: u32 = R_ARM_JUMP_SLOT;
#[cfg(target_arch = "aarch64")]
pub(crate) const R_GENERIC_JUMP_SLOT: u32 = R_AARCH64_JUMP_SLOT;
#[cfg(target_arch = "x86_64")]
pub(crate) const R_GENERIC_JUMP_SLOT: u32 = R_X86_64_JUMP_SLOT;

// 符号禁用写入的哨兵值：2 字符加终止符
pub(crate) const SYMBOL_PATCH_VALUE: [u8; 3] = *b":3\0";

// ELF 基本类型别名，按目标位宽选择
#[cfg(target_pointer_width = "64")]
pub type ElfAddr = u64;
#[cfg(target_pointer_width = "32")]
pub type ElfAddr = u32;
#[cfg(target_pointer_width = "64")]
pub type ElfOff = u64;
#[cfg(target_pointer_width = "32")]
pub type ElfOff = u32;
#[cfg(target_pointer_width = "64")]
pub type ElfXword = u64;
#[cfg(target_pointer_width = "32")]
pub type ElfXword = u32;
#[cfg(target_pointer_width = "64")]
pub type ElfSxword = i64;
#[cfg(target_pointer_width = "32")]
pub type ElfSxword = i32;
pub type ElfWord = u32;
pub type ElfHalf = u16;

// ELF 程序头，与 C 结构体 ElfW(Phdr) 内存布局一致
#[cfg(target_pointer_width = "64")]
#[repr(C)]
#[derive(Clone, Copy, Debug)]
pub struct ElfPhdr {
    pub p_type: ElfWord,
    pub p_flags: ElfWord,
    pub p_offset: ElfOff,
    pub p_vaddr: ElfAddr,
    pub p_paddr: ElfAddr,
    pub p_filesz: ElfXword,
    pub p_memsz: ElfXword,
    pub p_align: ElfXword,
}

#[cfg(target_pointer_width = "32")]
#[repr(C)]
#[derive(Clone, Copy, Debug)]
pub struct ElfPhdr {
    pub p_type: ElfWord,
    pub p_offset: ElfOff,
    pub p_vaddr: ElfAddr,
    pub p_paddr: ElfAddr,
    pub p_filesz: ElfWord,
    pub p_memsz: ElfWord,
    pub p_flags: ElfWord,
    pub p_align: ElfWord,
}

// ELF 动态段条目
#[repr(C)]
#[derive(Clone, Copy)]
pub(crate) struct ElfDyn {
    pub(crate) d_tag: ElfSxword,
    pub(crate) d_un: ElfXword,
}

// ELF 符号表条目，与 C 结构体 ElfW(Sym) 内存布局一致
#[cfg(target_pointer_width = "64")]
#[repr(C)]
#[derive(Clone, Copy)]
pub(crate) struct ElfSym {
    pub(crate) st_name: ElfWord,
    pub(crate) st_info: u8,
    pub(crate) st_other: u8,
    pub(crate) st_shndx: ElfHalf,
    pub(crate) st_value: ElfAddr,
    pub(crate) st_size: ElfXword,
}

#[cfg(target_pointer_width = "32")]
#[repr(C)]
#[derive(Clone, Copy)]
pub(crate) struct ElfSym {
    pub(crate) st_name: ElfWord,
    pub(crate) st_value: ElfAddr,
    pub(crate) st_size: ElfWord,
    pub(crate) st_info: u8,
    pub(crate) st_other: u8,
    pub(crate) st_shndx: ElfHalf,
}

// REL 重定位条目（无 addend）
#[repr(C)]
#[derive(Clone, Copy)]
pub(crate) struct ElfRel {
    pub(crate) r_offset: ElfAddr,
    pub(crate) r_info: ElfXword,
}

// RELA 重定位条目（含 addend）
#[repr(C)]
#[derive(Clone, Copy)]
pub(crate) struct ElfRela {
    pub(crate) r_offset: ElfAddr,
    pub(crate) r_info: ElfXword,
    pub(crate) r_addend: ElfSxword,
}

// 单个模块 dynamic section 的解析视图，仅在一次补丁调用内有效
#[derive(Debug)]
pub(crate) struct DynamicState {
    pathname: String,
    // 模块加载基址
    base_addr: usize,
    // 原始表指针，留作失败诊断输出
    hash: *const u32,
    strtab: *const c_char,
    symtab: *const ElfSym,
    // .rel(a).plt 表地址与字节大小
    relplt: usize,
    relplt_sz: usize,
    // DT_PLTREL 声明的编码是否携带 addend
    is_use_rela: bool,
    // DT_SONAME 在 strtab 中的偏移
    soname_idx: usize,
    has_soname: bool,
    // hash 表的 bucket / chain 数组与计数
    bucket: *const u32,
    bucket_cnt: u32,
    chain: *const u32,
    chain_cnt: u32,
}

impl DynamicState {
    pub(crate) fn is_use_rela(&self) -> bool {
        self.is_use_rela
    }

    // 四个原始表指针，按 sym / str / hash / plt 顺序
    pub(crate) fn table_ptrs(&self) -> (usize, usize, usize, usize) {
        (
            self.symtab as usize,
            self.strtab as usize,
            self.hash as usize,
            self.relplt,
        )
    }
}

include!("elf/parse.inc.rs");
include!("elf/patch.inc.rs");

#[cfg(test)]
mod tests;
