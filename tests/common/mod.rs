#![allow(dead_code)]

use std::path::Path;

use assert_fs::prelude::*;
use canrisk::{Model, Settings};

pub const V4_HEADER: &str = "BOADICEA import pedigree file format 4.0";
pub const V4_COLUMNS: &str = "FamID\tName\tTarget\tIndivID\tFathID\tMothID\tSex\tMZtwin\tDead\tAge\tYob\t1stBrCa\t2ndBrCa\tOvCa\tProCa\tPanCa\tAshkn\tBRCA1t\tBRCA1r\tBRCA2t\tBRCA2r\tPALB2t\tPALB2r\tATMt\tATMr\tCHEK2t\tCHEK2r\tER\tPR\tHER2\tCK14\tCK56";
pub const CANRISK2_COLUMNS: &str = "##FamID\tName\tTarget\tIndivID\tFathID\tMothID\tSex\tMZtwin\tDead\tAge\tYob\tBC1\tBC2\tOC\tPRO\tPAN\tAshkn\tBRCA1\tBRCA2\tPALB2\tATM\tCHEK2\tBARD1\tRAD51D\tRAD51C\tBRIP1\tER:PR:HER2:CK14:CK56";

/// One pedigree row, rendered in either file format.
#[derive(Debug, Clone)]
pub struct Row {
    pub family: &'static str,
    pub name: &'static str,
    pub target: bool,
    pub id: &'static str,
    pub father: &'static str,
    pub mother: &'static str,
    pub sex: &'static str,
    pub twin: &'static str,
    pub age: u16,
    pub yob: u16,
    /// BC1, BC2, OC, PRO, PAN
    pub cancers: [&'static str; 5],
    pub ashkenazi: bool,
    /// BRCA1 test as (type, result)
    pub brca1: (&'static str, &'static str),
}

impl Row {
    pub fn new(id: &'static str, sex: &'static str) -> Self {
        Self {
            family: "FAM1",
            name: id,
            target: false,
            id,
            father: "0",
            mother: "0",
            sex,
            twin: "0",
            age: 0,
            yob: 0,
            cancers: ["0"; 5],
            ashkenazi: false,
            brca1: ("0", "0"),
        }
    }

    pub fn v4(&self) -> String {
        let mut fields = self.common();
        fields.extend([self.brca1.0.to_string(), self.brca1.1.to_string()]);
        fields.extend(std::iter::repeat_n("0".to_string(), 8 + 5));
        fields.join("\t")
    }

    pub fn canrisk2(&self) -> String {
        let mut fields = self.common();
        fields.push(format!("{}:{}", self.brca1.0, self.brca1.1));
        fields.extend(std::iter::repeat_n("0:0".to_string(), 8));
        fields.push("0:0:0:0:0".to_string());
        fields.join("\t")
    }

    fn common(&self) -> Vec<String> {
        let mut fields: Vec<String> = [
            self.family,
            self.name,
            if self.target { "1" } else { "0" },
            self.id,
            self.father,
            self.mother,
            self.sex,
            self.twin,
            "0",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();
        fields.push(self.age.to_string());
        fields.push(self.yob.to_string());
        fields.extend(self.cancers.iter().map(|s| s.to_string()));
        fields.push(if self.ashkenazi { "1" } else { "0" }.to_string());
        fields
    }
}

/// Father, mother and a female target of the given age.
pub fn nuclear_family(target_age: u16) -> Vec<Row> {
    let year = canrisk::validate::current_year();
    let father = Row {
        age: target_age + 30,
        yob: year - target_age - 30,
        ..Row::new("f1", "M")
    };
    let mother = Row {
        age: target_age + 28,
        yob: year - target_age - 28,
        ..Row::new("m1", "F")
    };
    let target = Row {
        target: true,
        father: "f1",
        mother: "m1",
        age: target_age,
        yob: year - target_age,
        ..Row::new("t1", "F")
    };
    vec![father, mother, target]
}

pub fn v4_text(rows: &[Row]) -> String {
    let mut text = format!("{V4_HEADER}\n{V4_COLUMNS}\n");
    for row in rows {
        text.push_str(&row.v4());
        text.push('\n');
    }
    text
}

pub fn canrisk2_text(headers: &[&str], rows: &[Row]) -> String {
    let mut text = String::from("##CanRisk 2.0\n");
    for header in headers {
        text.push_str(&format!("##{header}\n"));
    }
    text.push_str(CANRISK2_COLUMNS);
    text.push('\n');
    for row in rows {
        text.push_str(&row.canrisk2());
        text.push('\n');
    }
    text
}

/// Shell script standing in for the engine. It records each invocation in
/// `calls.log`, and writes one section per flag. Risks depend on the
/// pedigree file contents so that identical inputs give identical output.
pub const FAKE_ENGINE: &str = r###"#!/bin/sh
target_age=@AGE@
if [ "$1" = "-v" ]; then
  echo "fake-engine 1.0"
  exit 0
fi
out=""
params=""
flags=""
while [ $# -gt 2 ]; do
  case "$1" in
    -o) out="$2"; shift 2 ;;
    -s) params="$2"; shift 2 ;;
    -e) echo "ethnicity $2" >> calls.log; shift 2 ;;
    -*) flags="$flags $1"; shift ;;
    *) break ;;
  esac
done
batch="$1"
echo "$(basename "$out")$flags" >> calls.log
ped=$(sed -n 4p "$batch")
seed=$(cksum < "$ped" | cut -d' ' -f1)
risk=$(awk -v s="$seed" 'BEGIN { printf "%.6f", (s % 997) / 10000 }')
{
for flag in $flags; do
  case "$flag" in
    -rr)
      echo "## REMAINING LIFETIME RISK"
      echo "Age, Cancer risk"
      awk -v a="$target_age" -v r="$risk" '$0 == "22" { printf "1, %d, %.6f\n", a + prev, r + (a + prev) / 1000 } { prev = $0 }' "$batch"
      ;;
    -rl)
      echo "## LIFETIME RISK (20-80)"
      echo "80, $risk"
      ;;
    -ry)
      echo "## 10-YEAR RISK (40-50)"
      echo "50, 0.030000"
      ;;
    -rj)
      echo "## 10-YEAR RISK (NHS PROTOCOL)"
      echo "$((target_age + 10)), 0.020000"
      ;;
    -p)
      echo "## PROBABILITIES"
      genes=$(sed -n 's/_mutation_frequency.*//p' "$params" | paste -sd, -)
      echo "nomut,$genes"
      n=$(echo "$genes" | tr ',' '\n' | wc -l)
      awk -v n="$n" 'BEGIN { printf "0.900000"; for (i = 0; i < n; i++) printf ",0.010000"; print "" }'
      ;;
  esac
done
} > "$out"
"###;

pub const SLOW_ENGINE: &str = "#!/bin/sh\nif [ \"$1\" = \"-v\" ]; then echo slow; exit 0; fi\nsleep 10\n";

pub const FAILING_ENGINE: &str = "#!/bin/sh\nif [ \"$1\" = \"-v\" ]; then echo failing; exit 0; fi\necho 'PROBAND HAS ALREADY HAD A CANCER' >&2\nexit 3\n";

/// Install `script` as every model's engine under `home`.
#[cfg(unix)]
pub fn install_engine(home: &assert_fs::TempDir, script: &str) -> Settings {
    use std::os::unix::fs::PermissionsExt;

    let engine = home.child("engine.sh");
    engine.write_str(script).unwrap();
    std::fs::set_permissions(engine.path(), std::fs::Permissions::from_mode(0o755)).unwrap();

    let mut settings = Settings::default();
    for model in [Model::Bc, Model::Oc, Model::Pc] {
        let ms = settings.model_mut(model);
        ms.home = home.path().to_path_buf();
        ms.executable = "engine.sh".to_string();
    }
    settings.work_root = Some(home.path().join("work"));
    settings
}

pub fn fake_engine(target_age: u16) -> String {
    FAKE_ENGINE.replace("@AGE@", &target_age.to_string())
}

pub fn calls(home: &Path) -> Vec<String> {
    std::fs::read_to_string(home.join("calls.log"))
        .unwrap_or_default()
        .lines()
        .map(str::to_string)
        .collect()
}
