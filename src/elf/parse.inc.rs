// 动态段解析，通过 include! 嵌入 elf.rs

impl DynamicState {
    // 从程序头定位 PT_DYNAMIC，遍历 (tag, value) 条目提取各表地址
    // hash / str / sym / plt 任一缺失即视为硬性解析失败
    pub(crate) unsafe fn parse(
        base_addr: usize,
        phdrs: &[ElfPhdr],
        pathname: &str,
    ) -> Result<Self, Errno> {
        if base_addr == 0 {
            return Err(Errno::Invalid);
        }

        let dhdr = phdrs
            .iter()
            .find(|ph| ph.p_type == PT_DYNAMIC)
            .ok_or_else(|| {
                log::warn(format_args!("no dynamic segment in {}", pathname));
                Errno::NoDynamic
            })?;

        let dyn_section = (base_addr + dhdr.p_vaddr as usize) as *const ElfDyn;
        let dyn_cnt = dhdr.p_memsz as usize / mem::size_of::<ElfDyn>();

        let mut state = DynamicState {
            pathname: pathname.to_string(),
            base_addr,
            hash: ptr::null(),
            strtab: ptr::null(),
            symtab: ptr::null(),
            relplt: 0,
            relplt_sz: 0,
            is_use_rela: false,
            soname_idx: 0,
            has_soname: false,
            bucket: ptr::null(),
            bucket_cnt: 0,
            chain: ptr::null(),
            chain_cnt: 0,
        };

        let dyn_entries = slice::from_raw_parts(dyn_section, dyn_cnt);
        for dyn_entry in dyn_entries {
            match dyn_entry.d_tag {
                DT_NULL => break,
                DT_STRTAB => {
                    let ptr = (base_addr + dyn_entry.d_un as usize) as *const c_char;
                    if (ptr as usize) < base_addr {
                        return Err(Errno::Format);
                    }
                    state.strtab = ptr;
                }
                DT_SYMTAB => {
                    let ptr = (base_addr + dyn_entry.d_un as usize) as *const ElfSym;
                    if (ptr as usize) < base_addr {
                        return Err(Errno::Format);
                    }
                    state.symtab = ptr;
                }
                DT_HASH => {
                    // SysV hash 布局：nbucket | nchain | bucket[nbucket] | chain[nchain]
                    let raw = (base_addr + dyn_entry.d_un as usize) as *const u32;
                    if (raw as usize) < base_addr {
                        return Err(Errno::Format);
                    }
                    state.hash = raw;
                    state.bucket_cnt = *raw;
                    state.chain_cnt = *raw.add(1);
                    state.bucket = raw.add(2);
                    state.chain = state.bucket.add(state.bucket_cnt as usize);
                }
                DT_JMPREL => {
                    let ptr = base_addr + dyn_entry.d_un as usize;
                    if ptr < base_addr {
                        return Err(Errno::Format);
                    }
                    state.relplt = ptr;
                }
                DT_PLTRELSZ => {
                    state.relplt_sz = dyn_entry.d_un as usize;
                }
                DT_PLTREL => {
                    // Android 上 arm64 为 DT_RELA，arm32 为 DT_REL
                    let val = dyn_entry.d_un;
                    state.is_use_rela = val == DT_RELA as ElfXword;
                    if val != DT_RELA as ElfXword && val != DT_REL as ElfXword {
                        log::warn(format_args!("unrecognized DT_PLTREL value {:#x}", val));
                    }
                }
                DT_SONAME => {
                    state.soname_idx = dyn_entry.d_un as usize;
                    state.has_soname = true;
                }
                _ => {}
            }
        }

        state.check()?;

        log::debug(format_args!(
            "parse OK: {} ({} PLT:{} nbucket:{} nchain:{})",
            state.pathname,
            if state.is_use_rela { "RELA" } else { "REL" },
            state.relplt_sz,
            state.bucket_cnt,
            state.chain_cnt
        ));

        Ok(state)
    }

    // 校验四个必需表是否均已找到
    fn check(&self) -> Result<(), Errno> {
        if self.hash.is_null()
            || self.strtab.is_null()
            || self.symtab.is_null()
            || self.relplt == 0
        {
            log::error(format_args!(
                "incomplete dynamic section in {} (at least one table is missing)",
                self.pathname
            ));
            return Err(Errno::BadDynamic);
        }
        Ok(())
    }

    // 读取 DT_SONAME 声明的模块名，与匹配所用名称比对
    pub(crate) unsafe fn soname_matches(&self, expected: &str) -> bool {
        if !self.has_soname {
            return true;
        }
        let name_ptr = self.strtab.add(self.soname_idx);
        match CStr::from_ptr(name_ptr).to_str() {
            Ok(soname) => soname == expected,
            Err(_) => false,
        }
    }
}
